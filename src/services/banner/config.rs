use crate::error::{CatalogError, Result};
use crate::http::RateLimiterConfig;
use crate::models::School;
use serde::Deserialize;

fn default_max_term_count() -> u32 {
    10
}

fn default_max_section_page_count() -> u32 {
    500
}

/// One Banner-hosted school
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BannerSchoolConfig {
    pub id: String,
    pub name: String,
    /// Registration host, e.g. `ssb1-reg.banner.marist.edu`
    pub hostname: String,
    #[serde(default = "default_max_term_count")]
    pub max_term_count: u32,
    /// Sections requested per search page
    #[serde(default = "default_max_section_page_count")]
    pub max_section_page_count: u32,
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,
}

impl BannerSchoolConfig {
    pub fn school(&self) -> School {
        School::new(&self.id, &self.name)
    }

    pub fn base_url(&self) -> String {
        format!("https://{}/StudentRegistrationSsb/ssb/", self.hostname)
    }

    /// Reject limiter and paging settings no upstream request could honor
    pub fn validate(&self) -> Result<()> {
        let limiter = &self.rate_limiter;
        if !limiter.rate.is_finite() || limiter.rate <= 0.0 {
            return Err(CatalogError::configuration(format!(
                "Banner school {} needs a positive rate_limiter.rate, got {}",
                self.id, limiter.rate
            )));
        }
        if limiter.burst == 0 {
            return Err(CatalogError::configuration(format!(
                "Banner school {} needs a rate_limiter.burst of at least 1",
                self.id
            )));
        }
        if !limiter.max_increase.is_finite() || limiter.max_increase < 0.0 {
            return Err(CatalogError::configuration(format!(
                "Banner school {} has an invalid rate_limiter.max_increase {}",
                self.id, limiter.max_increase
            )));
        }
        if self.max_section_page_count == 0 {
            return Err(CatalogError::configuration(format!(
                "Banner school {} needs a max_section_page_count of at least 1",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply() {
        let config: BannerSchoolConfig = serde_json::from_value(serde_json::json!({
            "id": "marist",
            "name": "Marist College",
            "hostname": "ssb1-reg.banner.marist.edu",
        }))
        .unwrap();

        assert_eq!(config.max_term_count, 10);
        assert_eq!(config.max_section_page_count, 500);
        assert_eq!(config.rate_limiter, RateLimiterConfig::default());
        assert_eq!(
            config.base_url(),
            "https://ssb1-reg.banner.marist.edu/StudentRegistrationSsb/ssb/"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unusable_limiter_settings_are_rejected() {
        let base: BannerSchoolConfig = serde_json::from_value(serde_json::json!({
            "id": "marist",
            "name": "Marist College",
            "hostname": "ssb1-reg.banner.marist.edu",
        }))
        .unwrap();

        let zero_rate = BannerSchoolConfig {
            rate_limiter: RateLimiterConfig {
                rate: 0.0,
                ..RateLimiterConfig::default()
            },
            ..base.clone()
        };
        let err = zero_rate.validate().unwrap_err();
        assert!(matches!(err, CatalogError::Configuration(_)));
        assert!(err.to_string().contains("rate_limiter.rate"));

        let nan_rate = BannerSchoolConfig {
            rate_limiter: RateLimiterConfig {
                rate: f64::NAN,
                ..RateLimiterConfig::default()
            },
            ..base.clone()
        };
        assert!(nan_rate.validate().is_err());

        let empty_burst = BannerSchoolConfig {
            rate_limiter: RateLimiterConfig {
                burst: 0,
                ..RateLimiterConfig::default()
            },
            ..base.clone()
        };
        assert!(empty_burst.validate().is_err());

        let no_paging = BannerSchoolConfig {
            max_section_page_count: 0,
            ..base
        };
        assert!(no_paging.validate().is_err());
    }
}
