pub mod collect;
pub mod logging;
pub mod report;

pub use collect::{collect_source_files, CollectOptions};
pub use logging::init_tracing;
pub use report::{exit_code, render_json, render_languages, render_pretty};
