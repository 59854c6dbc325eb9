//! Built-in backends.

mod directory;
mod github;

pub use directory::DirectoryBackend;
pub use github::{GitHubBackend, GitHubConfig};
