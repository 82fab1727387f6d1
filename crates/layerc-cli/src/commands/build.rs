use super::{
    format_tree, json_pretty, load_declaration, spin_fail, spin_ok, spinner, CommandError,
    EXIT_SUCCESS,
};
use layerc_core::{BuildOptions, LayerCompiler};
use layerc_runtime::select_executor;
use layerc_schema::PackageSource;
use std::path::PathBuf;

pub struct BuildArgs {
    pub declaration: PathBuf,
    pub subvolumes_dir: PathBuf,
    pub subvolume_rel_path: String,
    pub parent_layer_json: Option<PathBuf>,
    pub package_source: Option<PathBuf>,
    pub executor: String,
    pub descriptor_out: Option<PathBuf>,
    pub leave_writable: bool,
    pub show_tree: bool,
}

pub fn run(args: &BuildArgs, json: bool) -> Result<u8, CommandError> {
    let decl = load_declaration(&args.declaration)?;
    let executor = select_executor(&args.executor).map_err(|e| e.to_string())?;
    let compiler = LayerCompiler::new(&args.subvolumes_dir, executor);
    let source = args.package_source.clone().map(PackageSource::new);

    let mut build = compiler.load(&decl, args.parent_layer_json.as_deref(), source.as_ref())?;
    let options = BuildOptions {
        leave_writable: args.leave_writable,
        descriptor_out: args.descriptor_out.clone(),
    };

    let pb = (!json).then(|| spinner(&format!("building {}...", build.target())));
    let result = match compiler.build(&mut build, &args.subvolume_rel_path, &options) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("built {}", build.target()));
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("build of {} failed", build.target()));
            }
            return Err(e.into());
        }
    };

    let tree = if args.show_tree {
        Some(
            compiler
                .executor()
                .render(&result.subvolume_path)
                .map_err(|e| e.to_string())?,
        )
    } else {
        None
    };

    if json {
        let mut payload = serde_json::to_value(&result)
            .map_err(|e| format!("JSON serialization failed: {e}"))?;
        if let (Some(tree), Some(obj)) = (&tree, payload.as_object_mut()) {
            obj.insert("tree".to_owned(), tree.to_json());
        }
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("target:     {}", result.target);
        println!("subvolume:  {}", result.subvolume_path.display());
        println!("descriptor: {}", result.descriptor_path.display());
        println!("steps:      {}", result.steps);
        if let Some(tree) = &tree {
            print!("{}", format_tree(tree));
        }
    }
    Ok(EXIT_SUCCESS)
}
