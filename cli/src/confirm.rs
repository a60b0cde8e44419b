use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use toolbelt_core::Confirm;

/// Asks on stdout and reads one answer line from stdin.
#[derive(Debug, Default)]
pub struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, question: &str, cancel: &CancellationToken) -> bool {
        let mut stdout = tokio::io::stdout();
        if stdout.write_all(format!("{question} ").as_bytes()).await.is_err()
            || stdout.flush().await.is_err()
        {
            return false;
        }

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        let read = tokio::select! {
            read = stdin.read_line(&mut line) => read,
            _ = cancel.cancelled() => {
                debug!("confirmation cancelled");
                return false;
            }
        };
        matches!(read, Ok(n) if n > 0) && is_yes(&line)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("n"));
        assert!(!is_yes(""));
        assert!(!is_yes("yep"));
    }
}
