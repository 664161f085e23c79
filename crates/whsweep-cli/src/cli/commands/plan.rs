use whsweep_core::sweep;

use crate::cli::args::PlanArgs;
use crate::exit_codes::SUCCESS;

pub fn run(args: PlanArgs) -> anyhow::Result<i32> {
    let file = args.sweep.load()?;
    let configs = sweep::generate(&file.sweep_spec())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&configs)?);
        return Ok(SUCCESS);
    }

    println!(
        "{:<4} {:<36} {:<9} {:<10} {:>7} {:>9}",
        "#", "RESOURCE", "SIZE", "COMPUTE", "THREADS", "ITERATION"
    );
    for (i, c) in configs.iter().enumerate() {
        println!(
            "{:<4} {:<36} {:<9} {:<10} {:>7} {:>9}",
            i + 1,
            c.resource_name(),
            c.size.as_api_str(),
            c.compute_type.as_str(),
            c.threads,
            c.iteration
        );
    }
    println!(
        "{} experiments, parallelism {}, catalog {}, scaling factor {}",
        configs.len(),
        file.settings.parallelism,
        file.catalog,
        file.sweep.scaling_factor
    );
    Ok(SUCCESS)
}
