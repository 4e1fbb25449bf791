use std::sync::Arc;

use dsvdc_dsuid::Dsuid;
use dsvdc_frame::MAX_BODY_LEN;
use dsvdc_host::{HostConfig, Vdc, VdcHost, VdcServer};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{dsuid_error, host_error, io_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_listening, ListenInfo, OutputFormat};

/// dSUID of the vDC registered by `--demo-vdc`.
pub const DEMO_VDC_DSUID: &str = "9888DD3DB3454109B08877777777770000";
pub const DEMO_VDC_MODEL: &str = "myTestVDC";

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = host_config(&args)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    runtime.block_on(serve(config, args.demo_vdc, format))
}

fn host_config(args: &ServeArgs) -> CliResult<HostConfig> {
    let dsuid = args
        .dsuid
        .as_deref()
        .map(Dsuid::parse)
        .transpose()
        .map_err(|err| dsuid_error("invalid --dsuid", err))?;

    if args.max_message_size == 0 || args.max_message_size > MAX_BODY_LEN {
        return Err(CliError::new(
            USAGE,
            format!("--max-message-size must be between 1 and {MAX_BODY_LEN}"),
        ));
    }

    Ok(HostConfig {
        dsuid,
        name: args.name.clone(),
        listen: args.listen,
        max_message_size: args.max_message_size,
        idle_timeout: parse_duration(&args.idle_timeout)?,
        request_max_age: Some(parse_duration(&args.request_max_age)?),
        ..HostConfig::default()
    })
}

fn demo_vdc() -> CliResult<Vdc> {
    let dsuid = Dsuid::parse(DEMO_VDC_DSUID).map_err(|err| dsuid_error("demo vDC", err))?;
    Ok(Vdc::with_dsuid(dsuid, DEMO_VDC_MODEL))
}

async fn serve(config: HostConfig, demo: bool, format: OutputFormat) -> CliResult<i32> {
    let host = VdcHost::new(config);
    if demo {
        host.add_vdc(Arc::new(demo_vdc()?));
    }

    let server = VdcServer::bind(Arc::clone(&host))
        .await
        .map_err(|err| host_error("bind failed", err))?;
    let addr = server
        .local_addr()
        .map_err(|err| host_error("bind failed", err))?;

    print_listening(
        &ListenInfo {
            listen: addr.to_string(),
            dsuid: host.dsuid().to_string(),
            name: host.name().to_string(),
            vdcs: host.vdcs().len(),
        },
        format,
    );

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("interrupt received, shutting down");
                    shutdown.cancel();
                }
                Err(err) => tracing::warn!(error = %err, "failed to listen for interrupt"),
            }
        });
    }

    let waiter = {
        let host = Arc::clone(&host);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Ok(waited) = host.wait_until_connected(&shutdown).await {
                tracing::info!(
                    waited_ms = waited.as_millis() as u64,
                    "controller handshake completed"
                );
            }
        })
    };

    let served = tokio::spawn(server.serve(shutdown.clone()))
        .await
        .map_err(|err| CliError::new(INTERNAL, format!("server task failed: {err}")))?;
    shutdown.cancel();
    join_waiter(waiter).await;

    served.map_err(|err| host_error("server failed", err))?;
    Ok(SUCCESS)
}

/// Wait for the handshake waiter task. Returns false if it panicked or was
/// aborted.
async fn join_waiter(waiter: JoinHandle<()>) -> bool {
    match waiter.await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "connection waiter task failed");
            false
        }
    }
}
