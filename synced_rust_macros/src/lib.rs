mod table;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(Table)] derive macro
// ============================================================================

/// Derive macro that binds a row payload type to a remote table.
///
/// # Usage
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Clone, Table)]
/// #[table(name = "tasks")]
/// pub struct Task {
///     pub title: String,
///     pub completed: bool,
/// }
/// ```
///
/// Without `#[table(name = "...")]` the table name defaults to the snake_case
/// type name with an `s` appended (`ProductImage` -> `product_images`).
#[proc_macro_derive(Table, attributes(table))]
pub fn derive_table(input: TokenStream) -> TokenStream {
    table::derive_table(input)
}
