//! Command dispatcher
//!
//! Runs a batch on one session, strictly in order, and collects the
//! standard output of the commands flagged for capture.

use hp_core::error::CommandError;
use hp_core::traits::RemoteSession;
use hp_core::{BatchOutput, CommandBatch};

/// Execute every command of `batch` on `session`
///
/// Each command runs to completion before the next one starts. Output of
/// unflagged commands is read and discarded. Returns
/// [`BatchOutput::NoOutput`] when no command is flagged; stops at the first
/// failing command.
pub async fn execute_batch<S: RemoteSession>(
    session: &mut S,
    batch: &CommandBatch,
) -> Result<BatchOutput, CommandError> {
    let mut outputs = Vec::with_capacity(batch.captured_count());

    for (index, (command, capture)) in batch.iter().enumerate() {
        tracing::debug!("[{}/{}] Running '{}'", index + 1, batch.len(), command);
        let stdout = session.exec(command).await?;

        if capture {
            let text = String::from_utf8(stdout).map_err(|_| CommandError::InvalidUtf8 {
                command: command.to_string(),
            })?;
            outputs.push(text);
        } else {
            tracing::trace!("Discarding {} bytes from '{}'", stdout.len(), command);
        }
    }

    if batch.captured_count() == 0 {
        Ok(BatchOutput::NoOutput)
    } else {
        Ok(BatchOutput::Captured(outputs))
    }
}
