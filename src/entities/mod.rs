pub mod chat_order;
