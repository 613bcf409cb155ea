//! The operator gate: something that blocks until it is time to tear down.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

/// Blocks the orchestration flow until the operator releases it.
#[async_trait]
pub trait Trigger: Send {
    async fn wait(&mut self) -> io::Result<()>;
}

/// Releases once a full line (anything up to and including `\n`) has been
/// read, or the input reaches end-of-file.
pub struct LineTrigger<R> {
    reader: R,
}

impl<R> LineTrigger<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

/// A [`LineTrigger`] reading the harness's own stdin.
pub fn stdin_trigger() -> LineTrigger<tokio::io::BufReader<tokio::io::Stdin>> {
    LineTrigger::new(tokio::io::BufReader::new(tokio::io::stdin()))
}

#[async_trait]
impl<R> Trigger for LineTrigger<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn wait(&mut self) -> io::Result<()> {
        let mut line = Vec::new();
        let read = self.reader.read_until(b'\n', &mut line).await?;
        if read == 0 {
            debug!("control input closed; releasing trigger");
        } else {
            debug!(bytes = read, "trigger line received");
        }
        Ok(())
    }
}

/// Wraps another trigger so that Ctrl-C also releases it.
///
/// Without this an interrupt would kill the harness before teardown and
/// leave the coordinator and workers running.
///
/// Tokio keeps its SIGINT handler installed after the first interrupt, so
/// later Ctrl-C presses no longer terminate the process. Callers that want
/// a second interrupt to abort teardown must listen for it themselves.
pub struct OrInterrupt<T> {
    inner: T,
}

impl<T: Trigger> OrInterrupt<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: Trigger> Trigger for OrInterrupt<T> {
    async fn wait(&mut self) -> io::Result<()> {
        tokio::select! {
            result = self.inner.wait() => result,
            signal = tokio::signal::ctrl_c() => {
                debug!("interrupt received; releasing trigger");
                signal
            }
        }
    }
}

/// Releases immediately. Useful for non-interactive runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

#[async_trait]
impl Trigger for Immediate {
    async fn wait(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn newline_releases() {
        let mut trigger = LineTrigger::new(&b"\n"[..]);
        trigger.wait().await.unwrap();
    }

    #[tokio::test]
    async fn closed_input_releases() {
        let mut trigger = LineTrigger::new(&b""[..]);
        trigger.wait().await.unwrap();
    }

    #[tokio::test]
    async fn consumes_only_the_first_line() {
        let mut input: &[u8] = b"go now\nleftover";
        {
            let mut trigger = LineTrigger::new(&mut input);
            trigger.wait().await.unwrap();
        }
        let mut rest = String::new();
        input.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "leftover");
    }

    #[tokio::test]
    async fn blocks_until_newline_arrives() {
        let (reader, mut writer) = tokio::io::duplex(64);
        let mut trigger = LineTrigger::new(tokio::io::BufReader::new(reader));

        let waiting = tokio::spawn(async move { trigger.wait().await });

        use tokio::io::AsyncWriteExt;
        writer.write_all(b"partial").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        writer.write_all(b"\n").await.unwrap();
        waiting.await.unwrap().unwrap();
    }
}
