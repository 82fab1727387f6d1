use super::ImageItem;
use layerc_runtime::{RuntimeError, Subvolume};
use layerc_schema::{ImagePath, Provides, Requires, TargetLabel};

/// Starts a layer from an empty subvolume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemRoot {
    from_target: TargetLabel,
}

impl FilesystemRoot {
    pub fn new(from_target: TargetLabel) -> Self {
        Self { from_target }
    }
}

impl ImageItem for FilesystemRoot {
    fn from_target(&self) -> &TargetLabel {
        &self.from_target
    }

    fn provides(&self) -> Vec<Provides> {
        vec![Provides::Directory(ImagePath::root())]
    }

    fn requires(&self) -> Vec<Requires> {
        Vec::new()
    }

    fn build(&self, subvol: &mut Subvolume) -> Result<(), RuntimeError> {
        subvol.create()
    }
}
