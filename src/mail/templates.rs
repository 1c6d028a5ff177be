//! Message bodies for every email the marketplace sends.

use std::fmt::Write;

use super::Email;
use crate::domain::aggregates::{Contact, OrderLine};

pub fn registration(to: &str, backend_url: &str, token: &str) -> Email {
    let link = format!("{}/api/auth/register/confirm/{token}", backend_url.trim_end_matches('/'));
    Email {
        to: to.to_string(),
        subject: "Подтверждение регистрации".to_string(),
        body: format!("Для подтверждения регистрации перейдите по ссылке: {link}"),
    }
}

pub fn password_reset(to: &str, backend_url: &str, uid: &str, token: &str) -> Email {
    let link = format!("{}/api/auth/password/reset/confirm/{uid}/{token}", backend_url.trim_end_matches('/'));
    Email {
        to: to.to_string(),
        subject: "Сброс пароля".to_string(),
        body: format!("Для сброса пароля перейдите по ссылке: {link}"),
    }
}

/// Confirmation for the customer, listing every line with its shop.
pub fn customer_order(to: &str, order_id: i64, lines: &[OrderLine], contact: Option<&Contact>) -> Email {
    let mut body = format!("Ваш заказ #{order_id} был подтвержден.\nПодробности:\n");
    for line in lines {
        let _ = write!(
            body,
            "Продукт: {}\nМагазин: {}\nКоличество: {}\n\n",
            line.product_name, line.shop_name, line.quantity
        );
    }
    push_contact(&mut body, contact);
    Email { to: to.to_string(), subject: "Ваш заказ подтвержден".to_string(), body }
}

/// New-order notice for a supplier, listing only the lines of their shop.
pub fn supplier_order(to: &str, order_id: i64, lines: &[OrderLine], contact: Option<&Contact>) -> Email {
    let mut body = format!("Заказ #{order_id} был подтвержден.\nПодробности:\n");
    for line in lines {
        let _ = write!(body, "Продукт: {}\nКоличество: {}\n\n", line.product_name, line.quantity);
    }
    push_contact(&mut body, contact);
    Email { to: to.to_string(), subject: "Поступил новый заказ".to_string(), body }
}

fn push_contact(body: &mut String, contact: Option<&Contact>) {
    let Some(contact) = contact else { return };
    let _ = write!(
        body,
        "\nКонтактные данные:\nГород: {}\nУлица: {}\nДом: {}\nКорпус: {}\nСтроение: {}\nКвартира: {}\nТелефон: {}\n",
        contact.city, contact.street, contact.house, contact.structure, contact.building, contact.apartment, contact.phone
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product: &str, shop_id: i64, shop: &str, quantity: i32) -> OrderLine {
        OrderLine { product_name: product.into(), shop_id, shop_name: shop.into(), quantity }
    }

    #[test]
    fn registration_link_points_at_confirm_endpoint() {
        let email = registration("a@example.com", "http://localhost:8083/", "abc123");
        assert!(email.body.ends_with("http://localhost:8083/api/auth/register/confirm/abc123"));
    }

    #[test]
    fn reset_link_carries_uid_and_token() {
        let email = password_reset("a@example.com", "http://localhost:8083", "MTc", "tok");
        assert!(email.body.contains("/api/auth/password/reset/confirm/MTc/tok"));
    }

    #[test]
    fn customer_email_lists_lines_and_address() {
        let contact = Contact {
            id: 1,
            user_id: 2,
            city: "Казань".into(),
            street: "Баумана".into(),
            house: "5".into(),
            structure: String::new(),
            building: String::new(),
            apartment: "3".into(),
            phone: "+79990001122".into(),
        };
        let lines = [line("Телефон", 1, "Связной", 2), line("Чехол", 2, "Евросеть", 1)];

        let email = customer_order("buyer@example.com", 9, &lines, Some(&contact));

        assert_eq!(email.subject, "Ваш заказ подтвержден");
        assert!(email.body.starts_with("Ваш заказ #9 был подтвержден."));
        assert!(email.body.contains("Продукт: Чехол\nМагазин: Евросеть\nКоличество: 1"));
        assert!(email.body.contains("Город: Казань"));
    }

    #[test]
    fn supplier_email_without_contact() {
        let email = supplier_order("shop@example.com", 4, &[line("Телефон", 1, "Связной", 2)], None);
        assert_eq!(email.subject, "Поступил новый заказ");
        assert!(email.body.contains("Продукт: Телефон\nКоличество: 2"));
        assert!(!email.body.contains("Контактные данные"));
    }
}
