pub mod down;
pub mod up;
pub mod validate;
