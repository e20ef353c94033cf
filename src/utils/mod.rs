pub mod bit_vec;
pub mod file_interaction_local_and_cloud;
pub mod string_pool;
