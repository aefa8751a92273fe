pub mod branch;
pub mod cart;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod product;
pub mod product_variant;

pub use branch::Entity as Branch;
pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use payment::Entity as Payment;
pub use product::Entity as Product;
pub use product_variant::Entity as ProductVariant;
