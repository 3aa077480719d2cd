//! Webhook signature middleware.
//!
//! The chat platform signs every webhook delivery with HMAC-SHA256 over the raw request body, keyed by the channel
//! secret, and puts the base64-encoded result in a request header. This middleware recomputes the signature and
//! rejects the request before it reaches any handler when they do not match.
//!
//! The body has to be pulled out of the request to be signed, so on success it is re-injected as a fresh payload
//! for the downstream extractors.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorBadRequest,
    web,
    Error,
};
use cog_common::Secret;
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::helpers::signature_matches;

pub struct SignatureMiddlewareFactory {
    signature_header: String,
    secret: Secret<String>,
    // If false, the middleware will not check the signature and always allow the call
    enabled: bool,
}

impl SignatureMiddlewareFactory {
    pub fn new(signature_header: &str, secret: Secret<String>, enabled: bool) -> Self {
        SignatureMiddlewareFactory { signature_header: signature_header.into(), secret, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SignatureMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = SignatureMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SignatureMiddlewareService {
            signature_header: self.signature_header.clone(),
            secret: self.secret.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct SignatureMiddlewareService<S> {
    signature_header: String,
    secret: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SignatureMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.secret.reveal().clone();
        let signature_header = self.signature_header.clone();
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking webhook signature for request");
            if !enabled {
                trace!("🔐️ Signature checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {e:?}");
                ErrorBadRequest("Invalid request.")
            })?;
            let provided = req
                .headers()
                .get(&signature_header)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
                .unwrap_or_default();
            // Missing header, undecodable header and mismatching signature all get the same response, so a caller
            // cannot probe which part failed.
            if signature_matches(&secret, data.as_ref(), &provided) {
                trace!("🔐️ Signature check for request ✅️");
                req.set_payload(bytes_to_payload(data));
                service.call(req).await
            } else {
                warn!("🔐️ Webhook signature verification failed. Denying access.");
                Err(ErrorBadRequest("Invalid request."))
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
