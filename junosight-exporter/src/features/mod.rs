//! Built-in feature collectors.

mod alarm;
mod interfaces;
pub mod xml;

pub use alarm::AlarmCollector;
pub use interfaces::InterfacesCollector;

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use junosight_ssh::{CommandChannel, CommandClient, ConnectError, Result};
    use parking_lot::Mutex;

    /// Replies with canned output per command.
    pub struct CannedChannel {
        host: String,
        replies: HashMap<String, Vec<u8>>,
        pub commands: Mutex<Vec<String>>,
    }

    impl CannedChannel {
        pub fn new(host: &str) -> Self {
            Self {
                host: host.to_string(),
                replies: HashMap::new(),
                commands: Mutex::new(Vec::new()),
            }
        }

        pub fn reply(mut self, command: &str, output: &str) -> Self {
            self.replies
                .insert(command.to_string(), output.as_bytes().to_vec());
            self
        }

        pub fn client(self) -> (CommandClient, Arc<Self>) {
            let channel = Arc::new(self);
            (CommandClient::new(channel.clone()), channel)
        }
    }

    #[async_trait]
    impl CommandChannel for CannedChannel {
        fn host(&self) -> &str {
            &self.host
        }

        async fn run_command(&self, command: &str) -> Result<Vec<u8>> {
            self.commands.lock().push(command.to_string());
            self.replies
                .get(command)
                .cloned()
                .ok_or_else(|| ConnectError::Command {
                    command: command.to_string(),
                    status: 1,
                    stderr: "error: syntax error".to_string(),
                })
        }
    }
}
