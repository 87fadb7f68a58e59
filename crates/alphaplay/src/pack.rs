use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use renderer::pack_rgba;

use crate::cli::PackArgs;

pub fn pack(args: &PackArgs) -> Result<()> {
    if args.input.is_dir() {
        let count = pack_directory(&args.input, &args.output)?;
        tracing::info!(
            frames = count,
            output = %args.output.display(),
            "packed frame directory"
        );
    } else {
        pack_file(&args.input, &args.output)?;
        tracing::info!(output = %args.output.display(), "packed frame");
    }
    Ok(())
}

/// Writes `input` as a packed frame: mask on the left, colour on the right.
pub fn pack_file(input: &Path, output: &Path) -> Result<()> {
    let image = image::open(input)
        .with_context(|| format!("failed to decode {}", input.display()))?
        .to_rgba8();
    let packed = pack_rgba(&image);
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    packed
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::debug!(
        input = %input.display(),
        width = packed.width(),
        height = packed.height(),
        "packed"
    );
    Ok(())
}

/// Packs every PNG in `input` into `output`, keeping file names.
pub fn pack_directory(input: &Path, output: &Path) -> Result<usize> {
    let mut sources = Vec::new();
    for entry in fs::read_dir(input)
        .with_context(|| format!("failed to read {}", input.display()))?
    {
        let path = entry?.path();
        let is_png = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if is_png && path.is_file() {
            sources.push(path);
        }
    }
    if sources.is_empty() {
        bail!("no PNG files found in {}", input.display());
    }
    sources.sort();

    fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    for source in &sources {
        let Some(name) = source.file_name() else {
            continue;
        };
        pack_file(source, &output.join(name))?;
    }
    Ok(sources.len())
}
