pub mod server;

use std::path::PathBuf;

#[derive(Debug)]
pub enum Action {
    Server { config: PathBuf, debug: bool },
}
