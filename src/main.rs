use std::time::Duration;

use bpam_entrypoint::adapters::{signals, TcpProbe, TeeRunner, TokioSleeper};
use bpam_entrypoint::config::LogFormat;
use bpam_entrypoint::utils::{logger, validation::Validate};
use bpam_entrypoint::{CliConfig, Entrypoint, EntrypointError, FileConfig, ProcessEnv};

/// How long a signalled step gets to finish before the entrypoint exits anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

async fn run(cli: CliConfig, runner: TeeRunner) -> Result<i32, EntrypointError> {
    if let Some(path) = &cli.config {
        tracing::info!("Loading configuration from: {}", path.display());
    }
    let config = FileConfig::load(cli.config.as_deref())?;
    config.validate()?;

    let entrypoint = Entrypoint::new(TcpProbe, TokioSleeper, runner, config);
    entrypoint.run(&ProcessEnv, &cli.command).await
}

fn report(result: Result<i32, EntrypointError>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("❌ Entrypoint failed: {} (Category: {:?})", e, e.category());
            eprintln!("❌ {}", e);
            e.exit_code()
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = CliConfig::parse_args();

    match cli.log_format {
        LogFormat::Compact => logger::init_cli_logger(cli.verbose),
        LogFormat::Json => logger::init_json_logger(cli.verbose),
    }
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let runner = TeeRunner::new();
    let run = run(cli, runner.clone());
    tokio::pin!(run);

    let code = tokio::select! {
        result = &mut run => report(result),
        signal = signals::shutdown_signal() => {
            tracing::info!("Received signal {}, shutting down", signal);
            if runner.forward_signal(signal) {
                match tokio::time::timeout(SHUTDOWN_GRACE, &mut run).await {
                    Ok(result) => tracing::info!("Step finished with code {}", report(result)),
                    Err(_) => tracing::warn!(
                        "Step still running after {}s, exiting",
                        SHUTDOWN_GRACE.as_secs()
                    ),
                }
            }
            128 + signal
        }
    };

    std::process::exit(code);
}
