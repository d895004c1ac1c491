//! Events command implementation

use guardcache::cache::InvalidationTable;
use guardcache::error::Result;

use crate::cli::args::GlobalOptions;
use crate::models::EventDisplay;
use crate::output::Formattable;

/// Print the domain event invalidation table, including configured rules
pub fn run(opts: &GlobalOptions) -> Result<()> {
    let config = opts.load_config()?;
    let table = InvalidationTable::with_rules(&config.invalidation.rules);

    let rows: Vec<EventDisplay> = table.rules().iter().map(EventDisplay::from).collect();
    rows.print(opts.format)
}
