use std::path::PathBuf;
use std::sync::Arc;

/// 封面最大宽度，等比缩放不放大
pub const COVER_MAX_WIDTH: u32 = 800;
/// 缩略图固定尺寸，裁剪适配而不是加边
pub const THUMBNAIL_WIDTH: u32 = 300;
pub const THUMBNAIL_HEIGHT: u32 = 200;

/// 图片编解码的外部协作者接口
pub trait ImageCodec: Send + Sync {
    fn resize_width(&self, bytes: &[u8], max_width: u32) -> Result<Vec<u8>, CodecError>;
    fn crop_to_fit(&self, bytes: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CodecError>;
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CodecError(pub String);

/// 与地理编码不同，衍生图失败要显式上报给调用方
#[derive(Debug, thiserror::Error)]
pub enum DerivativeError {
    #[error("cover image could not be processed: {0}")]
    Codec(#[from] CodecError),
    #[error("failed to persist derivative: {0}")]
    Io(#[from] std::io::Error),
}

/// 从上传的封面生成两个确定性的衍生图并落盘到
/// `<root>/groups/<group_id>/` 下，覆盖旧文件。
pub struct DerivativePipeline {
    codec: Arc<dyn ImageCodec>,
    root: PathBuf,
}

impl DerivativePipeline {
    pub fn new(codec: Arc<dyn ImageCodec>, root: impl Into<PathBuf>) -> Self {
        Self {
            codec,
            root: root.into(),
        }
    }

    pub fn group_dir(&self, group_id: &str) -> PathBuf {
        self.root.join("groups").join(group_id)
    }

    pub async fn derive(
        &self,
        raw: &[u8],
        group_id: &str,
    ) -> Result<(Vec<u8>, Vec<u8>), DerivativeError> {
        let cover = self.codec.resize_width(raw, COVER_MAX_WIDTH)?;
        let thumbnail = self
            .codec
            .crop_to_fit(raw, THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT)?;

        let dir = self.group_dir(group_id);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join("cover.jpg"), &cover).await?;
        tokio::fs::write(dir.join("thumbnail.jpg"), &thumbnail).await?;

        Ok((cover, thumbnail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCodec;

    impl ImageCodec for FakeCodec {
        fn resize_width(&self, bytes: &[u8], max_width: u32) -> Result<Vec<u8>, CodecError> {
            let mut out = format!("resized:{}:", max_width).into_bytes();
            out.extend_from_slice(bytes);
            Ok(out)
        }

        fn crop_to_fit(&self, bytes: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CodecError> {
            let mut out = format!("cropped:{}x{}:", width, height).into_bytes();
            out.extend_from_slice(bytes);
            Ok(out)
        }
    }

    struct BrokenCodec;

    impl ImageCodec for BrokenCodec {
        fn resize_width(&self, _bytes: &[u8], _max_width: u32) -> Result<Vec<u8>, CodecError> {
            Err(CodecError("unsupported format".into()))
        }

        fn crop_to_fit(&self, _bytes: &[u8], _w: u32, _h: u32) -> Result<Vec<u8>, CodecError> {
            Err(CodecError("unsupported format".into()))
        }
    }

    #[tokio::test]
    async fn derive_writes_cover_and_thumbnail_under_group_dir() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = DerivativePipeline::new(Arc::new(FakeCodec), dir.path());

        let (cover, thumbnail) = pipeline.derive(b"rawimage", "g1").await.unwrap();
        assert!(cover.starts_with(b"resized:800:"));
        assert!(thumbnail.starts_with(b"cropped:300x200:"));

        let group_dir = dir.path().join("groups").join("g1");
        assert_eq!(std::fs::read(group_dir.join("cover.jpg")).unwrap(), cover);
        assert_eq!(
            std::fs::read(group_dir.join("thumbnail.jpg")).unwrap(),
            thumbnail
        );
    }

    #[tokio::test]
    async fn derive_overwrites_previous_derivatives() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = DerivativePipeline::new(Arc::new(FakeCodec), dir.path());

        pipeline.derive(b"first", "g1").await.unwrap();
        pipeline.derive(b"second", "g1").await.unwrap();

        let cover = std::fs::read(dir.path().join("groups/g1/cover.jpg")).unwrap();
        assert_eq!(cover, b"resized:800:second".to_vec());
    }

    #[tokio::test]
    async fn corrupt_image_surfaces_an_explicit_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = DerivativePipeline::new(Arc::new(BrokenCodec), dir.path());

        let err = pipeline.derive(b"notanimage", "g1").await.unwrap_err();
        assert!(matches!(err, DerivativeError::Codec(_)));
        assert!(!dir.path().join("groups/g1").exists());
    }
}
