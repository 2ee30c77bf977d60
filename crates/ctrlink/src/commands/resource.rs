//! Resource fetch handler.

use std::io::Write;

use bytesize::ByteSize;

use ctrlink_core::{Controller, ResourceDetails};

use crate::cli::{GlobalOpts, ResourceArgs};
use crate::error::CliError;
use crate::output;

fn detail(d: &ResourceDetails) -> String {
    [
        format!("Name:          {}", d.name),
        format!(
            "Content-Type:  {}",
            d.content_type.as_deref().unwrap_or("-")
        ),
        format!(
            "Last-Modified: {}",
            d.last_modified
                .map_or_else(|| "-".into(), |t| t.to_rfc3339())
        ),
    ]
    .join("\n")
}

pub async fn handle(
    controller: &Controller,
    args: ResourceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.details {
        let details = controller.resource_details(&args.name).await?;
        let out = output::render_single(&global.output, &details, detail, |d| {
            d.content_type.clone().unwrap_or_default()
        })?;
        output::print_output(&out, global.quiet);
        return Ok(());
    }

    let resource = controller.resource_data(&args.name).await?;
    let size = ByteSize::b(u64::try_from(resource.data.len()).unwrap_or(u64::MAX));
    match args.out {
        Some(path) => {
            std::fs::write(&path, &resource.data)?;
            if !global.quiet {
                eprintln!("Wrote {size} to {}", path.display());
            }
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&resource.data)?;
            stdout.flush()?;
        }
    }
    tracing::debug!(resource = %resource.name, %size, content_type = ?resource.content_type, "resource fetched");
    Ok(())
}
