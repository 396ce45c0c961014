mod children;
mod helpers;
mod import;
mod recipe;

pub(crate) use children::{cmd_ingredients, cmd_methods, cmd_portion};
pub(crate) use import::cmd_import;
pub(crate) use recipe::{cmd_create, cmd_delete, cmd_list, cmd_show};
