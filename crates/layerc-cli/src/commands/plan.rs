use super::{colorize_kind, json_pretty, load_declaration, CommandError, EXIT_SUCCESS};
use layerc_core::LayerCompiler;
use layerc_runtime::select_executor;
use layerc_schema::PackageSource;
use std::path::{Path, PathBuf};

pub fn run(
    declaration: &Path,
    subvolumes_dir: Option<&Path>,
    parent_layer_json: Option<&Path>,
    package_source: Option<PathBuf>,
    json: bool,
) -> Result<u8, CommandError> {
    let decl = load_declaration(declaration)?;
    let has_parent = parent_layer_json.is_some() || decl.layer.parent_layer.is_some();
    let subvolumes_dir = match subvolumes_dir {
        Some(dir) => dir.to_path_buf(),
        None if has_parent => {
            return Err("planning a layer with a parent needs --subvolumes-dir".to_owned().into())
        }
        None => PathBuf::from("."),
    };

    // Planning only reads the parent tree; no privileges needed.
    let executor = select_executor("direct").map_err(|e| e.to_string())?;
    let compiler = LayerCompiler::new(subvolumes_dir, executor);
    let source = package_source.map(PackageSource::new);
    let plan = compiler.plan(&decl, parent_layer_json, source.as_ref())?;

    let steps = plan.describe();
    if json {
        let payload = serde_json::json!({
            "target": plan.target().as_str(),
            "steps": steps,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("plan for {} ({} steps):", plan.target(), steps.len());
        for step in &steps {
            println!(
                "  {:>3}  {:<16} {}  [{}]",
                step.ordinal,
                colorize_kind(step.kind),
                step.description,
                step.from_target
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
