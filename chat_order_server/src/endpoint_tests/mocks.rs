use chat_order_engine::{
    bot_types::{MessageBody, ReplyToken},
    traits::MessageSender,
};
use mockall::mock;

mock! {
    pub Sender {}
    impl MessageSender for Sender {
        async fn reply(&self, token: &ReplyToken, messages: &[MessageBody]) -> bool;
        async fn push(&self, user_id: &str, messages: &[MessageBody]) -> bool;
    }
}
