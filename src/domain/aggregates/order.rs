//! Order Aggregate
//!
//! A user's basket is simply their order in status `new`. Confirming the
//! basket freezes it and raises [`OrderEvent::Confirmed`], which fans out
//! into one email for the customer and one per supplier shop.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

use crate::domain::aggregates::contact::Contact;
use crate::domain::events::{DomainEvent, OrderEvent};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    New,
    Confirmed,
    Assembled,
    Sent,
    Delivered,
    Canceled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::New,
        OrderStatus::Confirmed,
        OrderStatus::Assembled,
        OrderStatus::Sent,
        OrderStatus::Delivered,
        OrderStatus::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Confirmed => "confirmed",
            Self::Assembled => "assembled",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool { matches!(self, Self::Delivered | Self::Canceled) }

    /// new → confirmed → assembled → sent → delivered, and any live order may be canceled.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (current, next) if current == next => true,
            (New, Confirmed) | (Confirmed, Assembled) | (Assembled, Sent) | (Sent, Delivered) => true,
            (current, Canceled) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| OrderError::UnknownStatus(value.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderItem {
    pub id: Option<i64>,
    pub product_id: i64,
    pub shop_id: i64,
    pub quantity: i32,
    /// Price of the product in `shop_id`; `None` once the shop stops offering it.
    pub unit_price: Option<Decimal>,
    pub shop_owner_id: Option<i64>,
}

impl OrderItem {
    pub fn cost(&self) -> Decimal {
        self.unit_price.map_or(Decimal::ZERO, |price| price * Decimal::from(self.quantity))
    }
}

/// A requested basket line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BasketLine {
    pub product_id: i64,
    pub shop_id: i64,
    pub quantity: i32,
}

/// What a shop currently offers for a product.
#[derive(Clone, Debug, PartialEq)]
pub struct Offer {
    pub product_id: i64,
    pub shop_id: i64,
    pub price: Decimal,
    pub stock: i32,
    pub supplier: Option<Supplier>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Supplier {
    pub user_id: i64,
    pub email: String,
    pub is_active: bool,
}

/// Order line with display names, used when composing emails.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderLine {
    pub product_name: String,
    pub shop_id: i64,
    pub shop_name: String,
    pub quantity: i32,
}

#[derive(Clone, Debug)]
pub struct Order {
    id: i64,
    user_id: i64,
    contact_id: Option<i64>,
    dt: DateTime<Utc>,
    status: OrderStatus,
    items: Vec<OrderItem>,
    events: Vec<DomainEvent>,
}

impl Order {
    pub fn restore(
        id: i64,
        user_id: i64,
        contact_id: Option<i64>,
        dt: DateTime<Utc>,
        status: OrderStatus,
        items: Vec<OrderItem>,
    ) -> Self {
        Self { id, user_id, contact_id, dt, status, items, events: vec![] }
    }

    pub fn id(&self) -> i64 { self.id }
    pub fn user_id(&self) -> i64 { self.user_id }
    pub fn contact_id(&self) -> Option<i64> { self.contact_id }
    pub fn dt(&self) -> DateTime<Utc> { self.dt }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn total_cost(&self) -> Decimal { self.items.iter().map(OrderItem::cost).sum() }

    /// Distinct shops the order is split across, in item order.
    pub fn shops(&self) -> Vec<i64> {
        let mut shops = Vec::new();
        for item in &self.items {
            if !shops.contains(&item.shop_id) {
                shops.push(item.shop_id);
            }
        }
        shops
    }

    /// Adds lines to the basket, merging quantities for the same product and shop.
    /// Either every line is accepted or the basket is left untouched.
    pub fn add_lines(&mut self, lines: &[BasketLine], offers: &[Offer]) -> Result<(), OrderError> {
        if self.status != OrderStatus::New {
            return Err(OrderError::Locked);
        }
        let mut items = self.items.clone();
        merge_lines(&mut items, lines, offers)?;
        self.items = items;
        Ok(())
    }

    /// Replaces the whole item list. Lines for a product and shop already in
    /// the order keep that item's id; items not mentioned are dropped.
    pub fn replace_items(&mut self, lines: &[BasketLine], offers: &[Offer]) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::Locked);
        }
        let mut items = Vec::with_capacity(lines.len());
        merge_lines(&mut items, lines, offers)?;
        for item in &mut items {
            item.id = self
                .items
                .iter()
                .find(|old| old.product_id == item.product_id && old.shop_id == item.shop_id)
                .and_then(|old| old.id);
        }
        self.items = items;
        Ok(())
    }

    pub fn ensure_confirmable(&self) -> Result<(), OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::EmptyBasket);
        }
        if self.status != OrderStatus::New {
            return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::Confirmed });
        }
        Ok(())
    }

    /// Confirms the basket for delivery to `contact`.
    pub fn confirm(&mut self, contact: &Contact) -> Result<(), OrderError> {
        self.ensure_confirmable()?;
        if contact.user_id != self.user_id {
            return Err(OrderError::ContactNotFound);
        }
        self.contact_id = Some(contact.id);
        self.status = OrderStatus::Confirmed;
        self.raise_confirmed();
        Ok(())
    }

    /// Moves the order along the status graph. Entering `confirmed` this way
    /// notifies the same recipients as [`Order::confirm`].
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        if next == OrderStatus::Confirmed && self.items.is_empty() {
            return Err(OrderError::EmptyBasket);
        }
        self.status = next;
        if next == OrderStatus::Confirmed {
            self.raise_confirmed();
        }
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }

    fn raise_confirmed(&mut self) {
        let mut supplier_shops = Vec::new();
        for item in &self.items {
            let notify = item.shop_owner_id.is_some_and(|owner| owner != self.user_id);
            if notify && !supplier_shops.contains(&item.shop_id) {
                supplier_shops.push(item.shop_id);
            }
        }
        self.events.push(DomainEvent::Order(OrderEvent::Confirmed {
            order_id: self.id,
            customer_id: self.user_id,
            contact_id: self.contact_id,
            supplier_shops,
        }));
    }
}

fn merge_lines(items: &mut Vec<OrderItem>, lines: &[BasketLine], offers: &[Offer]) -> Result<(), OrderError> {
    let mut accepted = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity < 1 {
            return Err(OrderError::InvalidQuantity);
        }
        let offer = offers
            .iter()
            .find(|offer| offer.product_id == line.product_id && offer.shop_id == line.shop_id)
            .ok_or(OrderError::ProductNotOffered { product_id: line.product_id, shop_id: line.shop_id })?;
        if let Some(supplier) = offer.supplier.as_ref().filter(|supplier| !supplier.is_active) {
            return Err(OrderError::InactiveSupplier { email: supplier.email.clone(), shop_id: offer.shop_id });
        }
        accepted.push((line, offer));
    }

    for (line, offer) in accepted {
        let existing = items
            .iter_mut()
            .find(|item| item.product_id == line.product_id && item.shop_id == line.shop_id);
        let item = match existing {
            Some(item) => {
                item.quantity = item.quantity.checked_add(line.quantity).ok_or(OrderError::InvalidQuantity)?;
                item.unit_price = Some(offer.price);
                item
            }
            None => {
                items.push(OrderItem {
                    id: None,
                    product_id: line.product_id,
                    shop_id: line.shop_id,
                    quantity: line.quantity,
                    unit_price: Some(offer.price),
                    shop_owner_id: offer.supplier.as_ref().map(|supplier| supplier.user_id),
                });
                items.last_mut().ok_or(OrderError::InvalidQuantity)?
            }
        };
        if item.quantity > offer.stock {
            return Err(OrderError::InsufficientStock {
                product_id: offer.product_id,
                shop_id: offer.shop_id,
                available: offer.stock,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("Корзина пуста.")]
    EmptyBasket,
    #[error("ID контакта обязателен.")]
    ContactRequired,
    #[error("Контакт не найден.")]
    ContactNotFound,
    #[error("Количество должно быть положительным числом.")]
    InvalidQuantity,
    #[error("Товар ID={product_id} не продаётся в магазине ID={shop_id}.")]
    ProductNotOffered { product_id: i64, shop_id: i64 },
    #[error("Продавец {email} (магазин ID={shop_id}) неактивен. Невозможно создать заказ.")]
    InactiveSupplier { email: String, shop_id: i64 },
    #[error("Недостаточно товара ID={product_id} в магазине ID={shop_id}: доступно {available}.")]
    InsufficientStock { product_id: i64, shop_id: i64, available: i32 },
    #[error("Невозможно изменить статус заказа с {from} на {to}.")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Заказ уже оформлен и не может быть изменён.")]
    Locked,
    #[error("Некорректный статус: {0}. Доступные статусы: new, confirmed, assembled, sent, delivered, canceled")]
    UnknownStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUSTOMER: i64 = 10;

    fn offer(product_id: i64, shop_id: i64, owner: i64, stock: i32) -> Offer {
        Offer {
            product_id,
            shop_id,
            price: Decimal::new(150, 0),
            stock,
            supplier: Some(Supplier { user_id: owner, email: format!("owner{owner}@example.com"), is_active: true }),
        }
    }

    fn line(product_id: i64, shop_id: i64, quantity: i32) -> BasketLine {
        BasketLine { product_id, shop_id, quantity }
    }

    fn basket() -> Order { Order::restore(1, CUSTOMER, None, Utc::now(), OrderStatus::New, vec![]) }

    fn contact(user_id: i64) -> Contact {
        Contact {
            id: 5,
            user_id,
            city: "Москва".into(),
            street: "Тверская".into(),
            house: "1".into(),
            structure: String::new(),
            building: String::new(),
            apartment: "12".into(),
            phone: "+79991234567".into(),
        }
    }

    #[test]
    fn status_graph() {
        use OrderStatus::*;
        assert!(New.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Assembled));
        assert!(Assembled.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Delivered));
        assert!(Sent.can_transition_to(Canceled));
        assert!(New.can_transition_to(Canceled));
        assert!(!New.can_transition_to(Sent));
        assert!(!Confirmed.can_transition_to(New));
        assert!(!Delivered.can_transition_to(Canceled));
        assert!(!Canceled.can_transition_to(New));
        assert_eq!("assembled".parse::<OrderStatus>(), Ok(Assembled));
        assert!(matches!("processed".parse::<OrderStatus>(), Err(OrderError::UnknownStatus(_))));
    }

    #[test]
    fn add_lines_merges_same_product_and_shop() {
        let offers = [offer(1, 100, 20, 10), offer(2, 100, 20, 10)];
        let mut order = basket();
        order.add_lines(&[line(1, 100, 2), line(2, 100, 1)], &offers).unwrap();
        order.add_lines(&[line(1, 100, 3)], &offers).unwrap();

        assert_eq!(order.items().len(), 2);
        assert_eq!(order.items()[0].quantity, 5);
        assert_eq!(order.total_cost(), Decimal::new(900, 0));
    }

    #[test]
    fn add_lines_enforces_stock_on_merged_quantity() {
        let offers = [offer(1, 100, 20, 4)];
        let mut order = basket();
        order.add_lines(&[line(1, 100, 3)], &offers).unwrap();

        let err = order.add_lines(&[line(1, 100, 2)], &offers).unwrap_err();
        assert_eq!(err, OrderError::InsufficientStock { product_id: 1, shop_id: 100, available: 4 });
        assert_eq!(order.items()[0].quantity, 3, "failed add must leave the basket untouched");
    }

    #[test]
    fn add_lines_rejects_inactive_supplier_before_adding_anything() {
        let mut inactive = offer(2, 200, 21, 10);
        inactive.supplier = Some(Supplier { user_id: 21, email: "gone@example.com".into(), is_active: false });
        let offers = [offer(1, 100, 20, 10), inactive];
        let mut order = basket();

        let err = order.add_lines(&[line(1, 100, 1), line(2, 200, 1)], &offers).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Продавец gone@example.com (магазин ID=200) неактивен. Невозможно создать заказ."
        );
        assert!(order.is_empty());
    }

    #[test]
    fn add_lines_rejects_unknown_offer_and_bad_quantity() {
        let offers = [offer(1, 100, 20, 10)];
        let mut order = basket();
        assert_eq!(
            order.add_lines(&[line(1, 999, 1)], &offers),
            Err(OrderError::ProductNotOffered { product_id: 1, shop_id: 999 })
        );
        assert_eq!(order.add_lines(&[line(1, 100, 0)], &offers), Err(OrderError::InvalidQuantity));
    }

    #[test]
    fn confirm_empty_basket_fails() {
        let mut order = basket();
        assert_eq!(order.confirm(&contact(CUSTOMER)), Err(OrderError::EmptyBasket));
        assert_eq!(order.status(), OrderStatus::New);
    }

    #[test]
    fn confirm_with_foreign_contact_fails() {
        let mut order = basket();
        order.add_lines(&[line(1, 100, 1)], &[offer(1, 100, 20, 10)]).unwrap();
        assert_eq!(order.confirm(&contact(CUSTOMER + 1)), Err(OrderError::ContactNotFound));
        assert!(order.take_events().is_empty());
    }

    #[test]
    fn confirm_raises_event_for_each_distinct_supplier_shop() {
        let offers = [offer(1, 100, 20, 10), offer(2, 100, 20, 10), offer(3, 200, 21, 10)];
        let mut order = basket();
        order.add_lines(&[line(1, 100, 1), line(2, 100, 1), line(3, 200, 1)], &offers).unwrap();

        order.confirm(&contact(CUSTOMER)).unwrap();

        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(order.contact_id(), Some(5));
        assert_eq!(order.shops(), vec![100, 200]);
        let events = order.take_events();
        assert_eq!(
            events,
            vec![DomainEvent::Order(OrderEvent::Confirmed {
                order_id: 1,
                customer_id: CUSTOMER,
                contact_id: Some(5),
                supplier_shops: vec![100, 200],
            })]
        );
    }

    #[test]
    fn confirm_skips_shop_owned_by_the_customer() {
        let offers = [offer(1, 100, CUSTOMER, 10), offer(2, 200, 21, 10)];
        let mut order = basket();
        order.add_lines(&[line(1, 100, 1), line(2, 200, 1)], &offers).unwrap();

        order.confirm(&contact(CUSTOMER)).unwrap();

        let Some(DomainEvent::Order(OrderEvent::Confirmed { supplier_shops, .. })) = order.take_events().pop() else {
            panic!("confirmation event expected");
        };
        assert_eq!(supplier_shops, vec![200]);
    }

    #[test]
    fn confirmed_order_can_no_longer_be_filled() {
        let offers = [offer(1, 100, 20, 10)];
        let mut order = basket();
        order.add_lines(&[line(1, 100, 1)], &offers).unwrap();
        order.confirm(&contact(CUSTOMER)).unwrap();

        assert_eq!(order.add_lines(&[line(1, 100, 1)], &offers), Err(OrderError::Locked));
        assert_eq!(
            order.confirm(&contact(CUSTOMER)),
            Err(OrderError::InvalidTransition { from: OrderStatus::Confirmed, to: OrderStatus::Confirmed })
        );
    }

    #[test]
    fn transitions_follow_the_graph() {
        let offers = [offer(1, 100, 20, 10)];
        let mut order = basket();
        assert_eq!(order.transition_to(OrderStatus::Confirmed), Err(OrderError::EmptyBasket));
        order.add_lines(&[line(1, 100, 1)], &offers).unwrap();

        assert_eq!(
            order.transition_to(OrderStatus::Sent),
            Err(OrderError::InvalidTransition { from: OrderStatus::New, to: OrderStatus::Sent })
        );
        order.transition_to(OrderStatus::Confirmed).unwrap();
        assert_eq!(order.take_events().len(), 1);
        order.transition_to(OrderStatus::Assembled).unwrap();
        order.transition_to(OrderStatus::Sent).unwrap();
        order.transition_to(OrderStatus::Delivered).unwrap();
        assert!(order.transition_to(OrderStatus::Canceled).is_err());
        assert!(order.take_events().is_empty());
    }

    #[test]
    fn replace_items_drops_previous_lines() {
        let offers = [offer(1, 100, 20, 10), offer(2, 200, 21, 10)];
        let mut order = basket();
        order.add_lines(&[line(1, 100, 4)], &offers).unwrap();
        order.replace_items(&[line(2, 200, 1), line(2, 200, 2)], &offers).unwrap();

        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].product_id, 2);
        assert_eq!(order.items()[0].quantity, 3);
    }

    #[test]
    fn item_without_offer_costs_nothing() {
        let item = OrderItem { id: Some(1), product_id: 1, shop_id: 1, quantity: 3, unit_price: None, shop_owner_id: None };
        assert_eq!(item.cost(), Decimal::ZERO);
    }
}
