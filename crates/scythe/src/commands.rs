//! CLI command implementations

use anyhow::{bail, Context, Result};
use scytheconf::ScytheConfig;
use scytheproto::Response;
use std::time::Duration;

use scythe::{Bridge, BridgeClient, FileBridge, SocketBridge};

/// Which way to reach the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Transport {
    Socket,
    File,
}

/// Open a bridge. For the socket transport this waits for the host to dial in.
pub async fn connect(
    config: &ScytheConfig,
    transport: Transport,
    connect_wait: Duration,
) -> Result<BridgeClient<Box<dyn Bridge>>> {
    let bridge: Box<dyn Bridge> = match transport {
        Transport::Socket => {
            let bridge = SocketBridge::bind(&config.socket)
                .await
                .with_context(|| format!("Failed to listen on {}", config.socket.address()))?;
            eprintln!("Waiting for host on {} ...", bridge.local_addr());
            bridge.wait_for_host(connect_wait).await.with_context(|| {
                format!(
                    "No host connected within {:?}. Is scythe-host running with the same [socket] settings?",
                    connect_wait
                )
            })?;
            Box::new(bridge)
        }
        Transport::File => Box::new(
            FileBridge::new(&config.polling).context("Failed to prepare polling directory")?,
        ),
    };
    Ok(BridgeClient::new(bridge))
}

/// Print the project snapshot
pub async fn info(client: &BridgeClient<Box<dyn Bridge>>) -> Result<()> {
    let info = client.session_info().await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

/// Send one command with JSON params and print the response
pub async fn call(client: &BridgeClient<Box<dyn Bridge>>, command: &str, params: &str) -> Result<()> {
    let params: serde_json::Value =
        serde_json::from_str(params).context("Failed to parse params as JSON")?;
    let response = client.call(command, params).await?;
    print_response(&response)
}

/// Run Lua code in the host and print what it returned and printed
pub async fn lua(client: &BridgeClient<Box<dyn Bridge>>, code: &str) -> Result<()> {
    let output = client.execute_lua(code).await?;
    if let Some(console) = output.console.as_deref().filter(|c| !c.is_empty()) {
        print!("{}", console);
        if !console.ends_with('\n') {
            println!();
        }
    }
    if let Some(result) = output.result {
        println!("=> {}", result);
    }
    Ok(())
}

fn print_response(response: &Response) -> Result<()> {
    let json: serde_json::Value = response.to_value().into();
    println!("{}", serde_json::to_string_pretty(&json)?);
    if let Some(error) = response.error() {
        bail!("{}", error);
    }
    Ok(())
}
