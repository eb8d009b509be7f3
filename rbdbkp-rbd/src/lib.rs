//! Typed driver for the RBD/Ceph block store: image and snapshot lifecycle
//! (`driver`), the ssh-backed remote shell transport (`shell`), and the
//! export/import streaming pipeline (`transport`).

mod driver;
mod error;
mod shell;
mod transport;

pub use driver::{BlockStoreDriver, ImageInfo};
pub use error::BlockStoreError;
pub use shell::{shell_quote, Shell};
pub use transport::{run_stream, StreamRequest};
