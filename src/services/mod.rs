pub mod catalog;
pub mod client;
pub mod commit;
pub mod draft;
pub mod library;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;
