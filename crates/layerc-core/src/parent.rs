use crate::items::{FilesystemRoot, Item, ParentLayer};
use crate::CoreError;
use layerc_runtime::PrivilegedExecutor;
use layerc_schema::TargetLabel;
use layerc_store::{StoreError, SubvolumeDescriptor, SubvolumeLayout};
use std::path::Path;
use tracing::{debug, warn};

/// The item that starts a layer: an empty root, or a snapshot of the
/// subvolume named by the parent descriptor.
///
/// A descriptor file that does not exist, or one whose
/// `subvolume_rel_path` is null, means the layer has no parent.
pub fn gen_parent_layer_items(
    target: &TargetLabel,
    descriptor: Option<&Path>,
    layout: &SubvolumeLayout,
    executor: &dyn PrivilegedExecutor,
) -> Result<Item, CoreError> {
    let Some(descriptor_path) = descriptor else {
        return Ok(Item::FilesystemRoot(FilesystemRoot::new(target.clone())));
    };

    let desc = match SubvolumeDescriptor::read_from(descriptor_path) {
        Ok(desc) => desc,
        Err(StoreError::DescriptorNotFound(path)) => {
            warn!(
                "parent descriptor {} not found; building {target} from an empty root",
                path.display()
            );
            return Ok(Item::FilesystemRoot(FilesystemRoot::new(target.clone())));
        }
        Err(e) => return Err(e.into()),
    };

    let Some(rel) = desc.subvolume_rel_path.as_deref() else {
        debug!("parent descriptor {} has no subvolume", descriptor_path.display());
        return Ok(Item::FilesystemRoot(FilesystemRoot::new(target.clone())));
    };

    desc.verify_host()?;
    let path = layout.subvolume_path(rel)?;
    debug!("parent of {target} is {}", path.display());
    Ok(Item::ParentLayer(ParentLayer::new(
        target.clone(),
        path,
        executor,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerc_runtime::{RootOp, VirtualExecutor};
    use layerc_schema::{ImagePath, Provides};

    fn target() -> TargetLabel {
        TargetLabel::new("//images:child")
    }

    #[test]
    fn no_descriptor_gives_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SubvolumeLayout::new(dir.path());
        let item = gen_parent_layer_items(&target(), None, &layout, &VirtualExecutor::new())
            .unwrap();
        assert_eq!(item, Item::FilesystemRoot(FilesystemRoot::new(target())));
    }

    #[test]
    fn missing_descriptor_file_gives_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SubvolumeLayout::new(dir.path());
        let missing = dir.path().join("nope.json");
        let item = gen_parent_layer_items(
            &target(),
            Some(&missing),
            &layout,
            &VirtualExecutor::new(),
        )
        .unwrap();
        assert!(matches!(item, Item::FilesystemRoot(_)));
    }

    #[test]
    fn null_rel_path_gives_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SubvolumeLayout::new(dir.path());
        let desc_path = dir.path().join("empty.json");
        SubvolumeDescriptor::empty_root()
            .unwrap()
            .write_to(&desc_path)
            .unwrap();
        let item = gen_parent_layer_items(
            &target(),
            Some(&desc_path),
            &layout,
            &VirtualExecutor::new(),
        )
        .unwrap();
        assert!(matches!(item, Item::FilesystemRoot(_)));
    }

    #[test]
    fn descriptor_gives_parent_layer() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SubvolumeLayout::new(dir.path());
        let executor = VirtualExecutor::new();
        let parent = layout.subvolume_path("images/base").unwrap();
        executor
            .run(&RootOp::CreateSubvolume {
                path: parent.clone(),
            })
            .unwrap();
        executor
            .run(&RootOp::MakeDirs {
                path: parent.join("etc"),
            })
            .unwrap();

        let desc_path = dir.path().join("base.json");
        SubvolumeDescriptor::for_subvolume("images/base")
            .unwrap()
            .write_to(&desc_path)
            .unwrap();

        let item = gen_parent_layer_items(&target(), Some(&desc_path), &layout, &executor).unwrap();
        match item {
            Item::ParentLayer(layer) => {
                assert_eq!(layer.path(), parent.as_path());
                assert_eq!(
                    crate::ImageItem::provides(&layer),
                    vec![
                        Provides::Directory(ImagePath::root()),
                        Provides::Directory(ImagePath::new("/etc").unwrap()),
                    ]
                );
            }
            other => panic!("expected parent layer, got {other}"),
        }
    }

    #[test]
    fn descriptor_of_missing_subvolume_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SubvolumeLayout::new(dir.path());
        let desc_path = dir.path().join("gone.json");
        SubvolumeDescriptor::for_subvolume("images/gone")
            .unwrap()
            .write_to(&desc_path)
            .unwrap();
        let err = gen_parent_layer_items(
            &target(),
            Some(&desc_path),
            &layout,
            &VirtualExecutor::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Construction { kind: "parent_layer", .. }));
    }

    #[test]
    fn foreign_descriptor_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SubvolumeLayout::new(dir.path());
        let desc_path = dir.path().join("foreign.json");
        let mut desc = SubvolumeDescriptor::for_subvolume("images/base").unwrap();
        desc.hostname = "some-other-host.invalid".to_owned();
        desc.write_to(&desc_path).unwrap();
        let err = gen_parent_layer_items(
            &target(),
            Some(&desc_path),
            &layout,
            &VirtualExecutor::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Store(StoreError::ForeignHost { .. })));
    }
}
