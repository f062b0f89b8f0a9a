//! AWS WAFv2 implementation of [`ControlApi`].

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_wafv2::config::BehaviorVersion;
use aws_sdk_wafv2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_wafv2::Client;
use tracing::{debug, info};

use webacl_core::config::AwsConfig;

use crate::control::{classify_code, Association, ControlApi, ControlError};
use crate::resource::ResourceId;

/// Binds regional web ACLs through the WAFv2 API.
pub struct Wafv2ControlApi {
    client: Client,
}

impl Wafv2ControlApi {
    pub fn new(aws: &AwsConfig) -> Self {
        let region = aws_sdk_wafv2::config::Region::new(aws.region.clone());

        let mut waf_config = aws_sdk_wafv2::Config::builder()
            .region(region)
            .behavior_version(BehaviorVersion::latest());

        if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
            let creds = Credentials::new(
                key_id,
                secret,
                aws.session_token.clone(),
                None,
                "webacl-remediation-static",
            );
            waf_config = waf_config.credentials_provider(creds);
        }

        if let Some(url) = aws.endpoint() {
            waf_config = waf_config.endpoint_url(&url);
        }

        info!(region = %aws.region, "WAFv2 control client initialized");

        Self {
            client: Client::from_conf(waf_config.build()),
        }
    }

    /// ARN of the web ACL currently bound to `resource`, if any.
    async fn current_web_acl(&self, resource: &ResourceId) -> Result<Option<String>, ControlError> {
        let resp = self
            .client
            .get_web_acl_for_resource()
            .resource_arn(resource.as_str())
            .send()
            .await
            .map_err(classify_sdk_error)?;
        Ok(resp.web_acl().map(|acl| acl.arn().to_string()))
    }
}

#[async_trait]
impl ControlApi for Wafv2ControlApi {
    async fn associate(
        &self,
        web_acl_arn: &str,
        resource: &ResourceId,
    ) -> Result<Association, ControlError> {
        let current = self.current_web_acl(resource).await?;
        if current.as_deref() == Some(web_acl_arn) {
            debug!(resource_id = %resource, "Web ACL already associated");
            return Ok(Association::AlreadyAssociated);
        }
        if let Some(ref other) = current {
            debug!(resource_id = %resource, current = %other, "Replacing existing web ACL association");
        }

        self.client
            .associate_web_acl()
            .web_acl_arn(web_acl_arn)
            .resource_arn(resource.as_str())
            .send()
            .await
            .map_err(classify_sdk_error)?;

        Ok(Association::Associated)
    }
}

fn classify_sdk_error<E, R>(err: SdkError<E, R>) -> ControlError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let detail = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::TimeoutError(_) => ControlError::Timeout,
        SdkError::DispatchFailure(_) => ControlError::Network(detail),
        _ => classify_code(err.code(), err.message().unwrap_or(detail.as_str()).to_string()),
    }
}
