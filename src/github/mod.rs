pub mod client;
pub mod errors;
pub mod filter;

pub use client::{GitHubClient, GitHubOps};
pub use errors::GitHubError;
pub use filter::RepoFilter;
