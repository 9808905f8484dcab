pub mod no_platform;
