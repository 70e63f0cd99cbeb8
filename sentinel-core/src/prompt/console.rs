//! Line-oriented console prompter

use super::{ApprovalPrompter, PendingFile};
use crate::error::PromptError;
use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::warn;

/// Shows each pending file and reads a `y/N` answer
pub struct ConsolePrompter {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
    pager: Option<String>,
}

impl ConsolePrompter {
    pub fn new(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
            pager: None,
        }
    }

    /// Prompter on the process's stdin and stdout
    pub fn stdio() -> Self {
        Self::new(
            Box::new(io::BufReader::new(io::stdin())),
            Box::new(io::stdout()),
        )
    }

    /// Page file bodies through a shell command such as `less -R`
    pub fn with_pager(mut self, pager: Option<String>) -> Self {
        self.pager = pager.filter(|p| !p.trim().is_empty());
        self
    }

    fn body(file: &PendingFile) -> String {
        match file.diff() {
            Some(diff) => printable(&diff),
            None => printable(&file.text()),
        }
    }

    /// Send text through the pager. Returns false if it could not be run.
    fn page(pager: &str, text: &str) -> bool {
        let child = Command::new("sh")
            .arg("-c")
            .arg(pager)
            .stdin(Stdio::piped())
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start pager {:?}: {}", pager, e);
                return false;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            // A pager quit early closes the pipe; that is not an error
            let _ = stdin.write_all(text.as_bytes());
        }
        child.wait().map(|status| status.success()).unwrap_or(false)
    }
}

/// Escape terminal control characters so reviewed text cannot redraw or hide lines.
/// Newlines and tabs are kept.
fn printable(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_control() && c != '\n' && c != '\t' {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }
    out
}

#[async_trait]
impl ApprovalPrompter for ConsolePrompter {
    async fn decide(&self, file: &PendingFile) -> Result<bool, PromptError> {
        let body = Self::body(file);
        let mut output = self.output.lock().unwrap_or_else(|e| e.into_inner());

        writeln!(output)?;
        writeln!(output, "{}", "=".repeat(72))?;
        writeln!(output, "📄 {} [{}]", printable(&file.path), file.change_summary())?;
        writeln!(output, "{}", "=".repeat(72))?;

        let paged = match &self.pager {
            Some(pager) => {
                output.flush()?;
                Self::page(pager, &body)
            }
            None => false,
        };
        if !paged {
            writeln!(output, "{body}")?;
            writeln!(output, "{}", "-".repeat(72))?;
        }

        write!(output, "Trust this file? [y/N]: ")?;
        output.flush()?;

        let mut answer = String::new();
        let read = self
            .input
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .read_line(&mut answer)?;
        if read == 0 {
            return Err(PromptError::Closed);
        }

        let answer = answer.trim().to_lowercase();
        let approved = answer == "y" || answer == "yes";
        if approved {
            writeln!(output, "✅ Approved {}", printable(&file.path))?;
        } else {
            writeln!(output, "❌ Rejected {}", printable(&file.path))?;
        }
        Ok(approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::FileCandidate;
    use std::sync::Arc;

    /// Writer that keeps what was written for inspection
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn prompter(answers: &str) -> (ConsolePrompter, Captured) {
        let captured = Captured::default();
        let prompter = ConsolePrompter::new(
            Box::new(io::Cursor::new(answers.as_bytes().to_vec())),
            Box::new(captured.clone()),
        );
        (prompter, captured)
    }

    fn pending(path: &str, content: &str, previous: Option<&str>) -> PendingFile {
        PendingFile::new(
            FileCandidate::from_content(path, content.as_bytes().to_vec()),
            previous.map(|p| crate::fingerprint::fingerprint_bytes(p.as_bytes())),
            previous.map(|p| p.as_bytes().to_vec()),
        )
    }

    #[tokio::test]
    async fn test_reads_answers_in_order() {
        let (prompter, captured) = prompter("y\nno\n YES \n");

        assert!(prompter.decide(&pending("a.py", "a = 1\n", None)).await.unwrap());
        assert!(!prompter.decide(&pending("b.py", "b = 1\n", None)).await.unwrap());
        assert!(prompter.decide(&pending("c.py", "c = 1\n", None)).await.unwrap());

        let text = captured.text();
        assert!(text.contains("a = 1"));
        assert!(text.contains("Rejected b.py"));
    }

    #[tokio::test]
    async fn test_shows_diff_for_modified_file() {
        let (prompter, captured) = prompter("n\n");

        let file = pending("m.py", "x = 2\n", Some("x = 1\n"));
        assert!(!prompter.decide(&file).await.unwrap());

        let text = captured.text();
        assert!(text.contains("-x = 1"));
        assert!(text.contains("+x = 2"));
        assert!(text.contains("modified"));
    }

    #[tokio::test]
    async fn test_control_sequences_are_escaped() {
        let (prompter, captured) = prompter("n\n");

        let hidden = "import os\rx = 1  \x1b[2K\x1b[1Aos.system('curl evil')\n\tpass\n";
        let file = pending("evil\x1b[8m.py", hidden, None);
        assert!(!prompter.decide(&file).await.unwrap());

        let text = captured.text();
        assert!(!text.contains('\x1b'));
        assert!(!text.contains('\r'));
        assert!(text.contains("\\u{1b}[2K"));
        assert!(text.contains("import os\\rx = 1"));
        assert!(text.contains("os.system('curl evil')\n\tpass"));
        assert!(text.contains("evil\\u{1b}[8m.py"));
    }

    #[test]
    fn test_printable_keeps_layout() {
        assert_eq!(printable("a\tb\nc"), "a\tb\nc");
        assert_eq!(printable("a\u{7}b"), "a\\u{7}b");
    }

    #[tokio::test]
    async fn test_end_of_input_fails_closed() {
        let (prompter, _) = prompter("");
        let result = prompter.decide(&pending("a.py", "", None)).await;
        assert!(matches!(result, Err(PromptError::Closed)));
    }

    #[tokio::test]
    async fn test_batch_answers_every_file() {
        let (prompter, _) = prompter("y\nn\n");
        let files = vec![pending("a.py", "a", None), pending("b.py", "b", None)];

        let decisions = prompter.collect_batch(&files).await.unwrap();
        assert_eq!(decisions.get("a.py"), Some(&true));
        assert_eq!(decisions.get("b.py"), Some(&false));
    }
}
