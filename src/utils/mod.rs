/// Error taxonomy shared by the whole bot.
pub mod error;
/// Shorthands for common operations on the command context.
pub mod shorthand;
/// Parsers for the time formats accepted by commands.
pub mod time;
