use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use webhook_bots::{GpLinksClient, ScraperSessionFactory, VERSION};

fn prompt(label: &str) -> io::Result<String> {
    print!("{} ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn parse_u32(input: &str, default: u32) -> u32 {
    input.trim().parse().ok().filter(|value| *value > 0).unwrap_or(default)
}

#[test]
#[ignore = "Requires network access and manual input"]
fn interactive_live_bypass() -> Result<(), Box<dyn Error>> {
    println!("webhook-bots {} live bypass smoke test", VERSION);
    println!("Provide inputs when prompted. Press Enter to accept defaults.\n");

    let link = match std::env::var("GPLINKS_TEST_URL") {
        Ok(link) if !link.trim().is_empty() => link,
        _ => prompt("gplinks.co link:")?,
    };
    let attempts = parse_u32(&prompt("Max attempts [3]:")?, 3);
    let challenge_attempts = parse_u32(&prompt("Max challenge attempts per request [3]:")?, 3);

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(async {
        let sessions = ScraperSessionFactory::new(Duration::from_secs(30))
            .with_max_challenge_attempts(challenge_attempts as usize);
        GpLinksClient::new(Arc::new(sessions))
            .with_max_attempts(attempts)
            .bypass(&link)
            .await
    });

    match outcome {
        Ok(destination) => println!("\n{link} -> {destination}"),
        Err(err) => println!("\n{link} failed: {err} (bot would reply '{}')", err.reply_text()),
    }
    Ok(())
}
