use anyhow::Context;
use clap::Parser;
use gcodestream::{
    init_json_logging, init_logging, list_ports, stream_job, Cli, SerialTransport, SessionState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.json_log {
        init_json_logging()?;
    } else {
        init_logging()?;
    }

    if cli.list_ports {
        for port in list_ports()? {
            println!("{}\t{}", port.port_name, port.description);
        }
        return Ok(());
    }

    let file = cli
        .file
        .as_deref()
        .context("no G-code file given")?;
    let config = cli.load_config()?;
    let params = config
        .connection
        .serial_params(None)
        .context("no serial port configured; pass --port or set connection.port")?;

    let job = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let transport = SerialTransport::open(&params)?;
    tracing::info!(
        "Streaming {} to {} at {} baud",
        file.display(),
        params.port,
        params.baud_rate
    );

    let interrupted = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let status = stream_job(
        config.streaming.to_stream_config(),
        &job,
        Box::new(transport),
        cli.check,
        interrupted,
    )
    .await?;

    println!(
        "{}: {}/{} lines acknowledged",
        status.state, status.acknowledged, status.total
    );
    if status.state != SessionState::Completed {
        anyhow::bail!("job did not complete ({})", status.state);
    }
    Ok(())
}
