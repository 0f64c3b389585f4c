//! Consumer configuration.
//!
//! Options are typed and validated when they are set, so a controller never
//! runs with a value it cannot honor.

use std::time::Duration;

use crate::core::{
    DEFAULT_LOG2_BUFFER_SIZE, MAX_LOG2_BUFFER_SIZE, MIN_LOG2_BUFFER_SIZE, MIN_PROBE_SEQ,
    NACK_COOLDOWN, Name, PROBE_INTERVAL, ROUND_LEN, RTC_INTEREST_LIFETIME, TransportType,
};

use super::error::ConfigError;

/// Keys of the options readable through [`ConsumerConfig::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    /// Interest lifetime.
    InterestLifetime,
    /// Base name of requested segments.
    NetworkName,
    /// Production protocol of the stream.
    ProductionProtocol,
}

/// A typed option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketOption {
    /// Lifetime of every Interest sent.
    InterestLifetime(Duration),
    /// Base name; its suffix is the first segment requested.
    NetworkName(Name),
    /// Production protocol of the stream.
    ProductionProtocol(TransportType),
}

impl SocketOption {
    /// Key of this option.
    pub fn key(&self) -> OptionKey {
        match self {
            SocketOption::InterestLifetime(_) => OptionKey::InterestLifetime,
            SocketOption::NetworkName(_) => OptionKey::NetworkName,
            SocketOption::ProductionProtocol(_) => OptionKey::ProductionProtocol,
        }
    }
}

/// RTC consumer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    interest_lifetime: Duration,
    network_name: Name,
    production_protocol: TransportType,
    log2_buffer_size: u8,
    round_length: Duration,
    probe_interval: Duration,
    nack_cooldown: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            interest_lifetime: RTC_INTEREST_LIFETIME,
            network_name: Name::default(),
            production_protocol: TransportType::Rtc,
            log2_buffer_size: DEFAULT_LOG2_BUFFER_SIZE,
            round_length: ROUND_LEN,
            probe_interval: PROBE_INTERVAL,
            nack_cooldown: NACK_COOLDOWN,
        }
    }
}

impl ConsumerConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> ConsumerConfigBuilder {
        ConsumerConfigBuilder::new()
    }

    /// Interest lifetime.
    pub fn interest_lifetime(&self) -> Duration {
        self.interest_lifetime
    }

    /// Base name of requested segments.
    pub fn network_name(&self) -> Name {
        self.network_name
    }

    /// Production protocol.
    pub fn production_protocol(&self) -> TransportType {
        self.production_protocol
    }

    /// Ring size exponent `k` (the ring holds `2^k` slots).
    pub fn log2_buffer_size(&self) -> u8 {
        self.log2_buffer_size
    }

    /// Number of inflight ring slots.
    pub fn buffer_size(&self) -> u32 {
        1u32 << self.log2_buffer_size
    }

    /// Statistics round length.
    pub fn round_length(&self) -> Duration {
        self.round_length
    }

    /// Interval between RTT probes.
    pub fn probe_interval(&self) -> Duration {
        self.probe_interval
    }

    /// Cooldown after a NACK from an inactive producer.
    pub fn nack_cooldown(&self) -> Duration {
        self.nack_cooldown
    }

    /// Read an option.
    pub fn get(&self, key: OptionKey) -> SocketOption {
        match key {
            OptionKey::InterestLifetime => SocketOption::InterestLifetime(self.interest_lifetime),
            OptionKey::NetworkName => SocketOption::NetworkName(self.network_name),
            OptionKey::ProductionProtocol => {
                SocketOption::ProductionProtocol(self.production_protocol)
            }
        }
    }

    /// Set an option, rejecting values the consumer cannot honor.
    ///
    /// On error the configuration is left unchanged.
    pub fn set(&mut self, option: SocketOption) -> Result<(), ConfigError> {
        match option {
            SocketOption::InterestLifetime(lifetime) => {
                check_interest_lifetime(lifetime)?;
                self.interest_lifetime = lifetime;
            }
            SocketOption::NetworkName(name) => {
                check_network_name(&name)?;
                self.network_name = name;
            }
            SocketOption::ProductionProtocol(protocol) => {
                check_production_protocol(protocol)?;
                self.production_protocol = protocol;
            }
        }
        Ok(())
    }

    /// Check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_interest_lifetime(self.interest_lifetime)?;
        check_network_name(&self.network_name)?;
        check_production_protocol(self.production_protocol)?;

        if !(MIN_LOG2_BUFFER_SIZE..=MAX_LOG2_BUFFER_SIZE).contains(&self.log2_buffer_size) {
            return Err(ConfigError::InvalidBufferSize {
                value: self.log2_buffer_size,
                min: MIN_LOG2_BUFFER_SIZE,
                max: MAX_LOG2_BUFFER_SIZE,
            });
        }
        if self.round_length.is_zero() {
            return Err(ConfigError::ZeroInterval("round length"));
        }
        if self.probe_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("probe interval"));
        }
        if self.nack_cooldown.is_zero() {
            return Err(ConfigError::ZeroInterval("nack cooldown"));
        }
        Ok(())
    }
}

fn check_interest_lifetime(lifetime: Duration) -> Result<(), ConfigError> {
    if lifetime.is_zero() {
        return Err(ConfigError::ZeroInterestLifetime);
    }
    Ok(())
}

fn check_network_name(name: &Name) -> Result<(), ConfigError> {
    if name.suffix() >= MIN_PROBE_SEQ {
        return Err(ConfigError::SuffixInProbeRange(name.suffix()));
    }
    Ok(())
}

fn check_production_protocol(protocol: TransportType) -> Result<(), ConfigError> {
    match protocol {
        TransportType::Rtc => Ok(()),
        other => Err(ConfigError::UnsupportedProtocol(other.as_str())),
    }
}

/// Builder for [`ConsumerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConsumerConfigBuilder {
    config: ConsumerConfig,
}

impl ConsumerConfigBuilder {
    /// Create a builder holding the default configuration.
    pub fn new() -> Self {
        Self {
            config: ConsumerConfig::default(),
        }
    }

    /// Set the Interest lifetime.
    pub fn interest_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.interest_lifetime = lifetime;
        self
    }

    /// Set the base name.
    pub fn network_name(mut self, name: Name) -> Self {
        self.config.network_name = name;
        self
    }

    /// Set the production protocol.
    pub fn production_protocol(mut self, protocol: TransportType) -> Self {
        self.config.production_protocol = protocol;
        self
    }

    /// Set the ring size exponent.
    pub fn log2_buffer_size(mut self, k: u8) -> Self {
        self.config.log2_buffer_size = k;
        self
    }

    /// Set the statistics round length.
    pub fn round_length(mut self, length: Duration) -> Self {
        self.config.round_length = length;
        self
    }

    /// Set the probe interval.
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.config.probe_interval = interval;
        self
    }

    /// Set the inactive-producer NACK cooldown.
    pub fn nack_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.nack_cooldown = cooldown;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<ConsumerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
