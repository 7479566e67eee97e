pub mod work_list_loader;

pub use work_list_loader::{inventory_folder, load_work_list};
