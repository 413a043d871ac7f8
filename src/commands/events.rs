//! Events command implementation
//!
//! Streams fault events as they arrive, one record per event.

use crate::cli::args::{EventsArgs, OutputFormat};
use crate::cli::output::TableDisplay;
use crate::config::Config;
use crate::error::Result;
use crate::monitor::{DeviceMonitor, FaultEvent};

use std::io::{self, Write};
use std::time::Duration;
use tokio::sync::mpsc;

/// Execute the events command
pub fn run_events(args: &EventsArgs, format: OutputFormat, config: &Config) -> Result<()> {
    let monitor = DeviceMonitor::init(&config.monitor)?;
    let receiver = monitor.take_event_receiver()?;
    monitor.start()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let streamed = runtime.block_on(stream_events(
        receiver,
        args.duration.map(Duration::from_secs),
        args.count,
        |event| emit_event(event, format),
    ));

    monitor.shutdown()?;
    let seen = streamed?;
    log::info!("streamed {} fault event(s)", seen);
    Ok(())
}

/// Forward events to `emit` until `limit` events were seen, `duration`
/// elapsed or the sender closed. Returns the number of events forwarded.
pub async fn stream_events<F>(
    mut receiver: mpsc::Receiver<FaultEvent>,
    duration: Option<Duration>,
    limit: Option<usize>,
    mut emit: F,
) -> Result<usize>
where
    F: FnMut(&FaultEvent) -> Result<()>,
{
    let deadline = duration.map(|d| tokio::time::Instant::now() + d);
    let mut seen = 0;

    while limit.map_or(true, |l| seen < l) {
        let next = match deadline {
            Some(at) => match tokio::time::timeout_at(at, receiver.recv()).await {
                Ok(event) => event,
                Err(_) => break,
            },
            None => receiver.recv().await,
        };
        let Some(event) = next else {
            log::debug!("fault event stream closed");
            break;
        };

        emit(&event)?;
        seen += 1;
    }

    Ok(seen)
}

/// Print one event. JSON is written one object per line.
fn emit_event(event: &FaultEvent, format: OutputFormat) -> Result<()> {
    let line = match format {
        OutputFormat::Table => event.to_table(),
        OutputFormat::Json => serde_json::to_string(event)?,
        OutputFormat::Yaml => format!("---\n{}", event.to_yaml()?.trim_end()),
    };

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", line)?;
    handle.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::nvml::{EventTypeMask, RawEvent};

    fn event(xid: u64) -> FaultEvent {
        FaultEvent::from_raw(RawEvent {
            event_type: EventTypeMask::XID_CRITICAL_ERROR,
            xid: Some(xid),
            device_uuid: None,
        })
    }

    #[tokio::test]
    async fn test_stream_stops_at_limit() {
        let (tx, rx) = mpsc::channel(8);
        for xid in [13, 31, 79] {
            tx.send(event(xid)).await.unwrap();
        }

        let mut codes = Vec::new();
        let seen = stream_events(rx, None, Some(2), |ev| {
            codes.push(ev.xid);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(seen, 2);
        assert_eq!(codes, vec![13, 31]);
    }

    #[tokio::test]
    async fn test_stream_stops_when_closed() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(event(48)).await.unwrap();
        drop(tx);

        let seen = stream_events(rx, None, None, |_| Ok(())).await.unwrap();
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn test_stream_stops_after_duration() {
        let (_tx, rx) = mpsc::channel::<FaultEvent>(8);
        let seen = stream_events(rx, Some(Duration::from_millis(20)), None, |_| Ok(()))
            .await
            .unwrap();
        assert_eq!(seen, 0);
    }

    #[tokio::test]
    async fn test_stream_propagates_emit_error() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(event(79)).await.unwrap();

        let result = stream_events(rx, None, None, |_| {
            Err(AppError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "closed")))
        })
        .await;
        assert!(matches!(result, Err(AppError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe));
    }
}
