//! Markdown copies of approved job descriptions in object storage.

use anyhow::Result;
use aws_sdk_s3::primitives::ByteStream;
use tracing::info;

use crate::jd::render::render_jd_to_md;
use crate::models::intake::StoredJd;

#[derive(Clone)]
pub struct JdArchive {
    s3: aws_sdk_s3::Client,
    bucket: String,
}

impl JdArchive {
    pub fn new(s3: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { s3, bucket }
    }

    pub fn object_key(jd: &StoredJd) -> String {
        format!("jd/{}/{}/{}.md", jd.employee_id, jd.jd_session_id, jd.id)
    }

    /// Uploads the rendered JD and returns its object key.
    pub async fn upload(&self, jd: &StoredJd) -> Result<String> {
        let key = Self::object_key(jd);
        let md_content = render_jd_to_md(&jd.jd_json);

        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(md_content.into_bytes()))
            .content_type("text/markdown")
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("S3 upload failed: {e}"))?;

        info!("Archived job description to s3://{}/{}", self.bucket, key);
        Ok(key)
    }
}
