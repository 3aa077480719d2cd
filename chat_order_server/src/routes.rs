//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! The webhook handler must never block the worker thread: every backend and chat-platform call it makes is
//! async, and the whole batch for one delivery is processed before the response goes out so that the platform's
//! retry logic sees an honest status code.

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use chat_order_engine::{
    bot_types::{Channel, MessageBody, OutboundMessage},
    traits::{BotBackend, MessageSender, StateStore},
    BotSettings,
    EventDispatcher,
};
use log::*;

use crate::data_objects::{JsonResponse, WebhookPayload};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Webhook  ----------------------------------------------------
route!(chat_webhook => Post "/webhook" impl BotBackend, StateStore, MessageSender);
/// The single webhook entry point for the chat platform.
///
/// One delivery carries a batch of events. Each event is processed independently: a failure in one is logged and
/// answered with an apology on that event's reply token, and the rest of the batch still runs. The response is
/// always `200` once the signature middleware has let the request through, because the platform treats anything
/// else as a signal to retry the whole batch, which would re-run events that already succeeded.
pub async fn chat_webhook<B, S, M>(
    req: HttpRequest,
    body: web::Json<WebhookPayload>,
    dispatcher: web::Data<EventDispatcher<B, S>>,
    sender: web::Data<M>,
    settings: web::Data<BotSettings>,
) -> HttpResponse
where
    B: BotBackend + 'static,
    S: StateStore + 'static,
    M: MessageSender + 'static,
{
    trace!("🤖️ Received webhook request: {}", req.uri());
    let payload = body.into_inner();
    for event in &payload.events {
        let Some(inbound) = event.to_inbound() else {
            debug!("🤖️ Ignoring webhook event of type '{}'", event.event_type);
            continue;
        };
        match dispatcher.dispatch(&inbound, &settings).await {
            Ok(messages) => deliver(sender.get_ref(), messages).await,
            Err(e) => {
                warn!("🤖️ Error processing '{}' event for user [{}]. {e}", event.event_type, inbound.user_id);
                if let Some(token) = &inbound.reply_token {
                    let apology =
                        MessageBody::Text { text: "Sorry, something went wrong. Please try again shortly.".into() };
                    if !sender.reply(token, &[apology]).await {
                        warn!("🤖️ Could not deliver the failure notice to user [{}]", inbound.user_id);
                    }
                }
            },
        }
    }
    HttpResponse::Ok().json(JsonResponse::success("OK"))
}

/// Send the dispatcher's output, coalescing runs of messages on the same channel into a single transport call. The
/// reply token is single-use, so everything addressed to it must go out in one batch.
async fn deliver<M: MessageSender>(sender: &M, messages: Vec<OutboundMessage>) {
    let mut batch: Vec<MessageBody> = Vec::new();
    let mut current: Option<Channel> = None;
    for msg in messages {
        if current.as_ref() != Some(&msg.channel) {
            if let Some(channel) = current.take() {
                send_batch(sender, channel, &batch).await;
                batch.clear();
            }
            current = Some(msg.channel.clone());
        }
        batch.push(msg.body);
    }
    if let Some(channel) = current {
        send_batch(sender, channel, &batch).await;
    }
}

async fn send_batch<M: MessageSender>(sender: &M, channel: Channel, batch: &[MessageBody]) {
    let delivered = match &channel {
        Channel::Reply(token) => sender.reply(token, batch).await,
        Channel::Push(user_id) => sender.push(user_id, batch).await,
    };
    if !delivered {
        warn!("🤖️ Failed to deliver {} message(s) on {channel:?}", batch.len());
    }
}
