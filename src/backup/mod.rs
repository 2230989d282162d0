pub mod archive;
pub mod backup_config;
pub mod combine;
pub mod compress;
pub mod container;
pub mod dump;
pub mod file_ext;
pub mod finish;
pub mod log_sink;
pub mod result_error;
pub mod runner;
pub mod validate;
pub mod verify;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
