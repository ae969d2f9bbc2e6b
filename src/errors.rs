use thiserror::Error;

pub type WmResult<T> = Result<T, WmError>;

#[derive(Debug, Error)]
pub enum WmError {
    #[error("cannot open display: {0}")]
    Connect(#[from] x11rb::errors::ConnectError),

    #[error("connection to the X server lost: {0}")]
    Connection(#[from] x11rb::errors::ConnectionError),

    #[error("X request failed: {0}")]
    Reply(#[from] x11rb::errors::ReplyError),

    #[error("X request failed: {0}")]
    ReplyOrId(#[from] x11rb::errors::ReplyOrIdError),

    #[error("another window manager is already running")]
    OtherWmRunning,

    #[error("unrecoverable X error: {0}")]
    Protocol(String),
}
