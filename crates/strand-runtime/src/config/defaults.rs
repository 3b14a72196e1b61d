//! Compile-time defaults, merged by build.rs from the library defaults
//! and the optional file named by `STRAND_CONFIG_RS`.

include!(concat!(env!("OUT_DIR"), "/strand_merged_config.rs"));
