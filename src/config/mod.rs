#[derive(Clone, Debug)]
pub struct AppConfig {
    pub platform: PlatformConfig,
    pub functions: FunctionsConfig,
    pub support: SupportConfig,
}

#[derive(Clone, Debug)]
pub struct PlatformConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Clone, Debug)]
pub struct FunctionsConfig {
    pub ocr_url: String,
}

#[derive(Clone, Debug)]
pub struct SupportConfig {
    /// Organizational domain support-account emails must belong to.
    /// None disables the check.
    pub email_domain: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            platform: PlatformConfig {
                base_url: "http://localhost:8000".to_string(),
                api_key: String::new(),
            },
            functions: FunctionsConfig {
                ocr_url: "http://localhost:8000/functions/v1/invoice-ocr".to_string(),
            },
            support: SupportConfig { email_domain: None },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("PLATFORM_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            functions: FunctionsConfig {
                ocr_url: std::env::var("OCR_FUNCTION_URL")
                    .unwrap_or_else(|_| format!("{}/functions/v1/invoice-ocr", base_url)),
            },
            platform: PlatformConfig {
                base_url,
                api_key: std::env::var("PLATFORM_KEY").unwrap_or_default(),
            },
            support: SupportConfig {
                email_domain: std::env::var("SUPPORT_EMAIL_DOMAIN")
                    .ok()
                    .filter(|d| !d.is_empty()),
            },
        }
    }
}
