//! dwl-ctl — command-line interface for the dwld daemon.

use anyhow::{Context, Result};

mod cmd;

const DEFAULT_PORT: u16 = 9001;

fn print_usage() {
    println!("Usage: dwl-ctl [--port <port>] <command>");
    println!();
    println!("  status                              Current update state/result/progress");
    println!("  download <uri> [--type <type>]      Start a download (type: firmware|software, default firmware)");
    println!("  suspend                              Suspend the active download (resumable)");
    println!("  resume                               Clear suspend/abort and resume the active download");
    println!("  abort                                Abort the active download (not resumable)");
    println!();
    println!(
        "Options:\n  --port <port>                       API port (default: {})",
        DEFAULT_PORT
    );
    println!();
    println!("Examples:");
    println!("  dwl-ctl status");
    println!("  dwl-ctl download https://example.test/pkg.dwl");
    println!("  dwl-ctl download coaps://example.test/pkg.dwl --type software");
    println!("  dwl-ctl suspend");
    println!("  dwl-ctl resume");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(args[i].clone());
        }
        i += 1;
    }

    // Handle: download <uri> [--type <type>]
    if remaining.first().map(String::as_str) == Some("download") && remaining.len() >= 2 {
        let uri = remaining[1].clone();
        let mut update_type = "firmware".to_string();

        let mut i = 2;
        while i < remaining.len() {
            match remaining[i].as_str() {
                "--type" => {
                    i += 1;
                    update_type = remaining
                        .get(i)
                        .context("--type requires a value")?
                        .clone();
                }
                other => anyhow::bail!("Unknown option: {}", other),
            }
            i += 1;
        }

        return cmd::status::cmd_download(port, &uri, &update_type).await;
    }

    let remaining_refs: Vec<&str> = remaining.iter().map(|s| s.as_str()).collect();

    match remaining_refs.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["suspend"] => cmd::status::cmd_suspend(port).await,
        ["resume"] => cmd::status::cmd_resume(port).await,
        ["abort"] => cmd::status::cmd_abort(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
