//! Interactive command parsing for `dht-peer`.

use ringstore_dht::RecordKey;

/// One line typed at the peer prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `setup-dht <n> <datasetKey>`
    SetupDht { size: usize, dataset: String },
    /// `query-dht <key>`
    Query { key: RecordKey },
    /// `leave-dht`
    Leave,
    /// `join-dht`
    Join,
    /// `teardown-dht`
    Teardown,
    /// `deregister`
    Deregister,
    /// `status`
    Status,
    /// `help`
    Help,
    /// `quit`
    Quit,
}

/// Usage text printed by `help`.
pub const USAGE: &str = "\
Commands:
  setup-dht <n> <year>   Build a ring of n peers led by this one
  query-dht <event-id>   Look up one record
  leave-dht              Leave the ring
  join-dht               Join the ring
  teardown-dht           Dissolve the ring (leader only)
  deregister             Leave the manager's directory and exit
  status                 Show this peer's ring position
  help                   Show this text
  quit                   Exit";

impl Command {
    /// Parse one prompt line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut tokens = line.split_whitespace();
        let Some(command) = tokens.next() else {
            return Ok(None);
        };

        let command = match command {
            "setup-dht" => {
                let (Some(size), Some(dataset)) = (tokens.next(), tokens.next()) else {
                    return Err("usage: setup-dht <n> <year>".to_string());
                };
                let size = size
                    .parse()
                    .map_err(|_| format!("invalid ring size: {}", size))?;
                Command::SetupDht {
                    size,
                    dataset: dataset.to_string(),
                }
            }
            "query-dht" | "find" => {
                let key = tokens
                    .next()
                    .ok_or_else(|| "usage: query-dht <event-id>".to_string())?;
                let key = key
                    .parse()
                    .map_err(|_| format!("invalid event id: {}", key))?;
                Command::Query { key }
            }
            "leave-dht" => Command::Leave,
            "join-dht" => Command::Join,
            "teardown-dht" => Command::Teardown,
            "deregister" => Command::Deregister,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command: {}", other)),
        };

        if let Some(extra) = tokens.next() {
            return Err(format!("unexpected argument: {}", extra));
        }
        Ok(Some(command))
    }
}
