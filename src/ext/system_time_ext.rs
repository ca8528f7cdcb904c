use std::time::SystemTime;

pub trait SystemTimeExt {
    /// Whole seconds since the Unix epoch, 0 for earlier instants.
    fn to_unix_seconds(&self) -> u64;
}

impl SystemTimeExt for SystemTime {
    fn to_unix_seconds(&self) -> u64 {
        self.duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

impl SystemTimeExt for std::io::Result<SystemTime> {
    fn to_unix_seconds(&self) -> u64 {
        self.as_ref().map_or(0, |time| time.to_unix_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn converts_to_epoch_seconds() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_millis(90_500);
        assert_eq!(time.to_unix_seconds(), 90);
    }

    #[test]
    fn clamps_times_before_the_epoch() {
        let time = SystemTime::UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(time.to_unix_seconds(), 0);
    }

    #[test]
    fn failed_lookups_read_as_zero() {
        let missing: std::io::Result<SystemTime> =
            Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "no atime"));
        assert_eq!(missing.to_unix_seconds(), 0);
    }
}
