use super::{format_tree, json_pretty, CommandError, EXIT_SUCCESS};
use layerc_store::render_host_tree;
use std::path::Path;

pub fn run(path: &Path, json: bool) -> Result<u8, CommandError> {
    let tree = render_host_tree(path).map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&tree.to_json())?);
    } else {
        print!("{}", format_tree(&tree));
    }
    Ok(EXIT_SUCCESS)
}
