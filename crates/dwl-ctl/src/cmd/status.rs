//! Status, download, suspend, abort, and resume commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_json, post_json, post_json_body};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct FacadeResponse {
    state: String,
    result: String,
    package_uri: Option<String>,
    package_name: Option<String>,
    package_version: Option<String>,
    progress_percent: Option<u8>,
    last_http_error: Option<u16>,
}

#[derive(Serialize)]
struct DownloadRequest<'a> {
    uri: &'a str,
    update_type: &'a str,
}

#[derive(Deserialize)]
struct DownloadResponse {
    accepted: bool,
}

#[derive(Deserialize)]
struct ControlResponse {
    ok: bool,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: FacadeResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Update Status");
    println!("═══════════════════════════════════════");
    println!("  state    : {}", resp.state);
    println!("  result   : {}", resp.result);
    if let Some(uri) = &resp.package_uri {
        println!("  uri      : {}", uri);
    }
    if let Some(name) = &resp.package_name {
        println!("  name     : {}", name);
    }
    if let Some(version) = &resp.package_version {
        println!("  version  : {}", version);
    }
    if let Some(percent) = resp.progress_percent {
        println!("  progress : {}%", percent);
    }
    if let Some(code) = resp.last_http_error {
        println!("  last http error : {}", code);
    }

    Ok(())
}

pub async fn cmd_download(port: u16, uri: &str, update_type: &str) -> Result<()> {
    let body = DownloadRequest { uri, update_type };
    let resp: DownloadResponse =
        post_json_body(&format!("{}/download", base_url(port)), &body).await?;
    if resp.accepted {
        println!("Download started: {}", uri);
    } else {
        println!("Download rejected.");
    }
    Ok(())
}

pub async fn cmd_suspend(port: u16) -> Result<()> {
    let resp: ControlResponse = post_json(&format!("{}/suspend", base_url(port))).await?;
    println!("Suspend requested: {}", if resp.ok { "ok" } else { "failed" });
    Ok(())
}

pub async fn cmd_abort(port: u16) -> Result<()> {
    let resp: ControlResponse = post_json(&format!("{}/abort", base_url(port))).await?;
    println!("Abort requested: {}", if resp.ok { "ok" } else { "failed" });
    Ok(())
}

pub async fn cmd_resume(port: u16) -> Result<()> {
    let resp: ControlResponse = post_json(&format!("{}/resume", base_url(port))).await?;
    println!("Resume requested: {}", if resp.ok { "ok" } else { "failed" });
    Ok(())
}
