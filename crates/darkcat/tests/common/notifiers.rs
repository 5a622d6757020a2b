#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Mutex;

use darkcat::archive::bundle::PUBLIC_PREFIX;
use darkcat::archive::{Notification, Notifier};
use darkcat::NotifyError;

use super::harness::list_dir;

/// Accepts every notification and remembers what the output directory
/// looked like at the moment it was sent.
pub struct RecordingNotifier {
    output_dir: PathBuf,
    sent: Mutex<Vec<Notification>>,
    public_files_at_send: Mutex<Vec<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            sent: Mutex::new(Vec::new()),
            public_files_at_send: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn public_files_at_send(&self) -> Vec<Vec<String>> {
        self.public_files_at_send.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let public: Vec<String> = list_dir(&self.output_dir)
            .into_iter()
            .filter(|n| n.starts_with(PUBLIC_PREFIX))
            .collect();
        self.public_files_at_send.lock().unwrap().push(public);
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Rejects every notification.
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("connection refused".to_string()))
    }
}
