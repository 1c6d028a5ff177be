//! Aggregates module
pub mod contact;
pub mod order;
pub mod product;
pub mod shop;
pub mod user;

pub use contact::{ensure_contact_capacity, Contact, ContactData, ContactError, MAX_CONTACTS_PER_USER};
pub use order::{BasketLine, Offer, Order, OrderError, OrderItem, OrderLine, OrderStatus, Supplier};
pub use product::{Product, ProductDraft, ProductInfo, ProductInfoDraft, ProductPatch, ProductQuery};
pub use shop::{Category, NewShop, Parameter, Shop};
pub use user::{Actor, NewUser, User, UserError, UserPatch, UserRole};
