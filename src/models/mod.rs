mod account;
mod account_tree;
mod asset;
mod id;

pub use account::{Account, AccountArrangement};
pub use account_tree::{AccountTree, AccountTreeError};
pub use asset::AssetKind;
pub use id::{Id, IdError, ROOT_SENTINEL};
