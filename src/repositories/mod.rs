//! PostgreSQL repositories. Every method works inside a caller-owned transaction,
//! except task results which are written by workers outside any request.

mod categories;
mod contacts;
mod orders;
mod parameters;
mod products;
mod shops;
mod task_results;
mod users;

pub(crate) use categories::PgCategoriesRepository;
pub(crate) use contacts::PgContactsRepository;
pub(crate) use orders::{OrderFilter, PgOrdersRepository};
pub(crate) use parameters::PgParametersRepository;
pub(crate) use products::PgProductsRepository;
pub(crate) use shops::PgShopsRepository;
pub(crate) use task_results::PgTaskResultsRepository;
pub(crate) use users::PgUsersRepository;
pub use task_results::TaskRecord;
