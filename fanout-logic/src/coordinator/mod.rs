pub mod ack_handler;
pub mod pointer_handler;

/// What a handler decided to do with the bus delivery it was given. The
/// binary that owns the actual `lapin::Channel` translates this into
/// `basic_ack`/`basic_nack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    NackRequeue,
}
