//! Domain events
//!
//! Aggregates record events while they change; services drain them after the
//! transaction commits and turn them into background tasks.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomainEvent {
    Order(OrderEvent),
    User(UserEvent),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderEvent {
    /// The order left the basket. `supplier_shops` lists every shop with an
    /// owner other than the customer.
    Confirmed { order_id: i64, customer_id: i64, contact_id: Option<i64>, supplier_shops: Vec<i64> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Registered { user_id: i64, token: String },
    PasswordResetRequested { user_id: i64, uid: String, token: String },
}
