// sherpa-common: wire protocol and shared types for the Sherpa live channel.

pub mod protocol;
pub mod types;
