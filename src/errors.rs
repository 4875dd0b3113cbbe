use thiserror::Error;

#[derive(Error, Debug)]
pub enum PilotError {
    #[error("package read error: {0}")] PackageRead(String),
    #[error("member write error: {0}")] MemberWrite(String),
    #[error("config error: {0}")] Config(String),
    #[error("corpus error: {0}")] Corpus(String),
}

pub type Result<T, E = PilotError> = std::result::Result<T, E>;
