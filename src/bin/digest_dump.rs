use chat_ledger::integrity::fingerprint;
use chat_ledger::ledger::abi::to_bytes32;

fn main() -> anyhow::Result<()> {
    let mut urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        urls.push("https://res.cloudinary.com/demo/image/upload/v1741156546/cat.png".to_string());
    }

    let mut failures = 0usize;
    for url in &urls {
        match fingerprint(url) {
            Ok((canonical, digest)) => {
                println!("url:       {url}");
                println!("canonical: {canonical}");
                println!("digest:    {digest}");
                println!("bytes32:   {}", to_bytes32(&digest)?);
                println!();
            }
            Err(e) => {
                eprintln!("{url}: {e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} file references could not be fingerprinted", urls.len());
    }
    Ok(())
}
