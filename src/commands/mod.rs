//! Commands the presentation layer sends into the session loop

use tokio::sync::mpsc;

const COMMAND_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Fetch now unless a fetch is already in flight
    RefreshNow,
    ToggleCompact,
    /// Reload credentials and organization from scratch
    Restart,
    Shutdown,
}

impl Command {
    /// Map a line typed on the terminal to a command
    pub fn from_input(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "r" | "refresh" => Some(Command::RefreshNow),
            "c" | "compact" => Some(Command::ToggleCompact),
            "restart" => Some(Command::Restart),
            "q" | "quit" | "exit" => Some(Command::Shutdown),
            _ => None,
        }
    }
}

/// Cloneable sender side; every method reports whether the session still listens
#[derive(Debug, Clone)]
pub struct CommandHandle {
    tx: mpsc::Sender<Command>,
}

impl CommandHandle {
    pub fn channel() -> (Self, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        (Self { tx }, rx)
    }

    pub async fn send(&self, command: Command) -> bool {
        match self.tx.send(command).await {
            Ok(()) => true,
            Err(_) => {
                log::debug!("Session gone, dropped {:?}", command);
                false
            }
        }
    }

    pub async fn refresh_now(&self) -> bool {
        self.send(Command::RefreshNow).await
    }

    pub async fn toggle_compact(&self) -> bool {
        self.send(Command::ToggleCompact).await
    }

    pub async fn restart(&self) -> bool {
        self.send(Command::Restart).await
    }

    pub async fn shutdown(&self) -> bool {
        self.send(Command::Shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_input() {
        assert_eq!(Command::from_input("r\n"), Some(Command::RefreshNow));
        assert_eq!(Command::from_input(" Compact "), Some(Command::ToggleCompact));
        assert_eq!(Command::from_input("restart"), Some(Command::Restart));
        assert_eq!(Command::from_input("q"), Some(Command::Shutdown));
        assert_eq!(Command::from_input("x"), None);
    }

    #[tokio::test]
    async fn test_handle_reports_closed_session() {
        let (handle, mut rx) = CommandHandle::channel();
        assert!(handle.refresh_now().await);
        assert_eq!(rx.recv().await, Some(Command::RefreshNow));

        drop(rx);
        assert!(!handle.shutdown().await);
    }
}
