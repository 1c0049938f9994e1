//! In-memory package index, version classification, and the external
//! resolver protocol client (spec §3, §4.1, §4.3).

mod index;
mod package;
mod resolver;

pub use index::{distinct_keys, EmptyInstalledSource, InstalledSource, PackageChanged, PackageIndex, Resolved};
pub use package::{Classification, InProgress, Package, Status};
pub use resolver::{
    resolve, ActionTag, Rejected, RejectReason, ResolveOutcome, ResolveRequest, Selected, Target,
};
