pub mod db;
pub mod enrich;
pub mod error;
pub mod logging;
pub mod pipeline;

pub mod util {
    pub mod env;
}
