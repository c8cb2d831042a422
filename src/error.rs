use ewma_rate::ticker::TickerError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("--alpha must be in (0, 1], got {0}")]
    Alpha(f64),
    #[error("--interval-ms must be greater than zero")]
    ZeroInterval,
    #[error("--producers must be greater than zero")]
    ZeroProducers,
    #[error("--burst must be greater than zero")]
    ZeroBurst,
    #[error("--burst must be at most {}, got {0}", i64::MAX)]
    BurstTooLarge(u64),
    #[error("pause of {0}s between increments is out of range")]
    PauseOutOfRange(f64),
    #[error("--events-per-sec must be greater than zero")]
    ZeroEventRate,
    #[error("series count at position {index} is negative: {value}")]
    NegativeCount { index: usize, value: i64 },
}

pub fn check_alpha(alpha: f64) -> Result<(), ConfigError> {
    if alpha.is_finite() && alpha > 0.0 && alpha <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::Alpha(alpha))
    }
}

/// Stable process exit codes: 2 bad configuration, 3 ticker failure, 1 other.
pub fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.is::<ConfigError>() {
            return 2;
        }
        if cause.is::<TickerError>() {
            return 3;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_bounds() {
        assert!(check_alpha(1.0).is_ok());
        assert!(check_alpha(0.01).is_ok());
        assert_eq!(check_alpha(0.0), Err(ConfigError::Alpha(0.0)));
        assert_eq!(check_alpha(1.5), Err(ConfigError::Alpha(1.5)));
        assert!(check_alpha(f64::NAN).is_err());
        assert!(check_alpha(-0.2).is_err());
    }

    #[test]
    fn exit_code_config() {
        let err = anyhow::Error::from(ConfigError::ZeroProducers);
        assert_eq!(exit_code_for_error(&err), 2);
    }

    #[test]
    fn exit_code_config_behind_context() {
        let err = anyhow::Error::from(ConfigError::ZeroInterval).context("validating simulate");
        assert_eq!(exit_code_for_error(&err), 2);
    }

    #[test]
    fn exit_code_ticker() {
        let err = anyhow::Error::from(TickerError::ZeroInterval);
        assert_eq!(exit_code_for_error(&err), 3);
    }

    #[test]
    fn exit_code_other() {
        let err = anyhow::anyhow!("other");
        assert_eq!(exit_code_for_error(&err), 1);
    }
}
