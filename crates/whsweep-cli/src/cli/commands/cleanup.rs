use tracing::error;
use whsweep_core::{naming, SweepFile};

use super::runner_builder;
use crate::cli::args::CleanupArgs;
use crate::exit_codes;

pub async fn run(args: CleanupArgs) -> anyhow::Result<i32> {
    let mut file = SweepFile::from_file(&args.config)?;
    if let Some(catalog) = &args.catalog {
        file.catalog = catalog.clone();
    }
    file.validate()?;
    naming::validate_identifier("warehouse id", &args.warehouse_id)?;

    let base_schema = if args.keep_schemas {
        None
    } else {
        Some(match &args.schema {
            Some(schema) => {
                naming::validate_identifier("schema", schema)?;
                schema.clone()
            }
            None => naming::experiment_schema(&file.settings.schema_prefix, &args.warehouse_id)?,
        })
    };

    let client = runner_builder::workspace_client()?;
    let coordinator = runner_builder::build_cleanup(&file, &client);
    match coordinator
        .cleanup_resource(&args.warehouse_id, &args.warehouse_id, base_schema.as_deref())
        .await
    {
        Ok(summary) => {
            for schema in &summary.dropped_schemas {
                println!("dropped {}", schema);
            }
            println!("deleted warehouse {}", args.warehouse_id);
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "cleanup incomplete");
            println!("NEEDS ATTENTION: {}", e);
            Ok(exit_codes::NEEDS_ATTENTION)
        }
    }
}
