//! CLI command implementations.
//!
//! | Module  | Commands handled |
//! |---------|------------------|
//! | `serve` | `Serve`          |
//! | `init`  | `Init`           |
//! | `check` | `Check`          |

pub mod check;
pub mod init;
pub mod serve;

pub use check::cmd_check;
pub use init::cmd_init;
pub use serve::cmd_serve;
