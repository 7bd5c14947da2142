//! Built-in plugins
//!
//! Small analyses shipped with the server: string transforms for the
//! playground, page statistics for the crawler.

mod link_audit;
mod page_stats;
mod reverse;
mod uppercase;

pub use link_audit::LinkAuditPlugin;
pub use page_stats::PageStatsPlugin;
pub use reverse::ReversePlugin;
pub use uppercase::UppercasePlugin;
