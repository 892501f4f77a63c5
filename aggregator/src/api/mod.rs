pub mod echo;
pub mod entries;
pub mod users;
pub mod utils;
