// Library root
// -----------
// The binary (`main.rs`) drives the interactive setup in `ui`; everything
// the setup needs lives in the modules below.
//
// Module responsibilities:
// - `upload`: the tree uploader, replicating a local directory tree under a
//   remote folder, parent folders first.
// - `folder_map`: local directory -> remote folder id bindings for one run.
// - `store`: the `RemoteStore` capability the uploader talks to.
// - `api`: Google Drive v3 client implementing `RemoteStore`.
// - `gcloud`: login, quota project and access tokens via the `gcloud` tool.
// - `config`: settings from the environment and from the previous run.
// - `progress`: progress bar decorator around any `RemoteStore`.
// - `ui`: the guided, prompt-driven flow.
// - `error`: typed errors for the library side.
pub mod api;
pub mod config;
pub mod error;
pub mod folder_map;
pub mod gcloud;
pub mod progress;
pub mod store;
pub mod ui;
pub mod upload;

pub use error::{AuthError, RemoteError, UploadError};
pub use folder_map::FolderMap;
pub use store::{ContainerId, RemoteStore};
pub use upload::{upload_tree, UploadSummary};
