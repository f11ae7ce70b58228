//! Byte forwarding with recording on the side

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::recording::StreamRecorder;
use crate::Result;

/// Read buffer size per stream
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Copy `reader` to `writer` verbatim while recording every chunk
///
/// Each chunk is written and flushed before it is recorded. Recording
/// failures are logged and never stop forwarding. On clean end of stream
/// the recorder is flushed and the number of forwarded bytes returned.
///
/// # Errors
///
/// Returns error if reading the source or writing the destination fails.
/// The recorder is not flushed in that case.
pub async fn tee_stream<R, W>(
    mut reader: R,
    mut writer: W,
    mut tap: StreamRecorder,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let source = tap.source();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut forwarded = 0u64;

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }

        writer.write_all(&chunk[..n]).await?;
        writer.flush().await?;
        forwarded += n as u64;

        if let Err(e) = tap.record(&chunk[..n]) {
            warn!("{source}: recording error: {e}");
        }
    }

    if let Err(e) = tap.flush() {
        warn!("{source}: flush error: {e}");
    }
    debug!("{source}: end of stream after {forwarded} bytes");

    Ok(forwarded)
}
