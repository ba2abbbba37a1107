use clap::{Args, Subcommand};
use pomoquest_core::{export_data, import_data};
use std::fs;
use std::path::PathBuf;

use crate::app::App;

#[derive(Args)]
pub struct DataCommand {
    #[command(subcommand)]
    pub command: DataSubcommand,
}

#[derive(Subcommand)]
pub enum DataSubcommand {
    /// Write a JSON backup of all data
    Export {
        /// Output file (defaults to stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Replace all data with a JSON backup
    Import {
        /// Backup file to read
        file: PathBuf,
    },
}

impl DataCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            DataSubcommand::Export { output } => {
                let json = export_data(app.local.as_ref())?;
                match output {
                    Some(path) => {
                        fs::write(path, json)?;
                        println!("Exported data to {}", path.display());
                    }
                    None => println!("{}", json),
                }
            }

            DataSubcommand::Import { file } => {
                let contents = fs::read_to_string(file)
                    .map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;
                let aggregate = import_data(app.local.as_ref(), &contents)?;
                let records = aggregate.daily_records.len();
                // Goes through the store so the import is pushed like any other change.
                app.store.replace_all(aggregate);
                println!(
                    "Imported {} daily record{} from {}",
                    records,
                    if records == 1 { "" } else { "s" },
                    file.display()
                );
            }
        }

        Ok(())
    }
}
