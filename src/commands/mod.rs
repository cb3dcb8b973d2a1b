pub mod checks;
pub mod manager_commands;
pub mod user_commands;

/// A way to group commands together.
///
/// Implementors of this trait can return a list of their commands within their own module.
/// Typically, you would group commands by their required permissions.
///
/// The implementors should not directly "own" the commands. You should simply generate them by
/// running Poise's function and returning the result. This way, you only need to `pub` the
/// implementor and not the commands themselves.
pub trait CommandsContainer {
    type Data;
    type Error;

    fn get_all() -> Vec<poise::Command<Self::Data, Self::Error>>;
}
