// ── Record relay ──
//
// Consumer side of the output stream: decode line-delimited records
// produced elsewhere and mirror them into an address space.

use futures_util::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::OutputRecord;
use crate::space::AddressSpace;

/// Line counts from one [`relay`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub applied: usize,
    pub sentinels: usize,
    pub rejected: usize,
}

/// Read records from `input` until EOF or cancellation, apply each one to
/// `space` and echo it to `out`. Lines that do not decode are logged and
/// skipped; blank lines are ignored.
pub async fn relay<R, W>(
    space: &AddressSpace,
    input: R,
    mut out: W,
    cancel: &CancellationToken,
) -> std::io::Result<RelayStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = LinesStream::new(input.lines());
    let mut stats = RelayStats::default();

    loop {
        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = lines.next() => match next {
                Some(line) => line?,
                None => break,
            },
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: OutputRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "undecodable record skipped");
                stats.rejected += 1;
                continue;
            }
        };

        if record.is_powered() {
            let written = space.apply(&record);
            debug!(device = %record.name, written, "record applied");
            stats.applied += 1;
        } else {
            stats.sentinels += 1;
        }

        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
    }

    Ok(stats)
}
