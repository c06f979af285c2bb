pub mod birthday;
pub mod member_count;
