//! The `contract!` macro and its helpers.

/// Declare a service contract.
///
/// ```
/// use duplex_rpc::ServiceError;
///
/// duplex_rpc::contract! {
///     #[contract(Sensor, client = SensorClient)]
///     /// Controls a sensor.
///     pub trait SensorControl {
///         /// Power the device on.
///         fn initialize(&self);
///         fn set_rate(&self, hz: u32, smoothing: f32) -> u32;
///     }
/// }
///
/// struct Device;
///
/// impl SensorControl for Device {
///     async fn initialize(&self) -> Result<(), ServiceError> {
///         Ok(())
///     }
///
///     async fn set_rate(&self, hz: u32, _smoothing: f32) -> Result<u32, ServiceError> {
///         Ok(hz.min(30))
///     }
/// }
/// ```
///
/// expands to:
/// - the trait `SensorControl`, whose methods return
///   `impl Future<Output = Result<R, ServiceError>> + Send` (implement them
///   with `async fn`),
/// - the marker `Sensor`, implementing `Contract` and `Dispatch<S>` for
///   every `S: SensorControl`,
/// - the proxy `SensorClient<R, C = MsgPackCodec>` with one `async fn` per
///   operation, returning `duplex_rpc::Result<R>`.
///
/// Operation names on the wire are the method names. Arguments travel as one
/// tuple; operations without arguments send an empty payload. Void
/// operations answer with an empty success payload that is never decoded.
#[macro_export]
macro_rules! contract {
    (
        #[contract($marker:ident, client = $client:ident)]
        $(#[$meta:meta])*
        $vis:vis trait $name:ident {
            $(
                $(#[$fmeta:meta])*
                fn $method:ident(&self $(, $arg:ident : $ty:ty)*) $(-> $ret:ty)?;
            )*
        }
    ) => {
        $(#[$meta])*
        $vis trait $name: ::core::marker::Send + ::core::marker::Sync + 'static {
            $(
                $(#[$fmeta])*
                fn $method(&self $(, $arg: $ty)*) -> impl ::core::future::Future<
                    Output = ::core::result::Result<
                        $crate::__contract_ret!($($ret)?),
                        $crate::ServiceError,
                    >,
                > + ::core::marker::Send;
            )*
        }

        #[doc = concat!("Marker type for the `", stringify!($name), "` contract.")]
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $marker;

        impl $crate::contract::Contract for $marker {
            fn descriptor() -> &'static $crate::contract::ContractDescriptor {
                static DESCRIPTOR: $crate::contract::ContractDescriptor =
                    $crate::contract::ContractDescriptor {
                        name: stringify!($name),
                        operations: &[
                            $(
                                $crate::contract::OperationDescriptor {
                                    name: stringify!($method),
                                    params: &[
                                        $(
                                            $crate::contract::ParamDescriptor {
                                                name: stringify!($arg),
                                                ty: stringify!($ty),
                                            },
                                        )*
                                    ],
                                    returns: $crate::__contract_returns!($($ret)?),
                                },
                            )*
                        ],
                    };
                &DESCRIPTOR
            }
        }

        impl<S: $name> $crate::contract::Dispatch<S> for $marker {
            fn handlers<C: $crate::codec::PayloadCodec>(
            ) -> ::std::vec::Vec<(&'static str, $crate::contract::HandlerFn<S>)> {
                $(
                    fn $method<Svc: $name, Codec: $crate::codec::PayloadCodec>(
                        service: ::std::sync::Arc<Svc>,
                        payload: $crate::bytes::Bytes,
                    ) -> $crate::contract::BoxFuture<'static, $crate::contract::HandlerResult> {
                        ::std::boxed::Box::pin(async move {
                            $crate::__contract_unpack!(Codec, payload; $($arg: $ty),*);
                            let value = match service.$method($($arg),*).await {
                                ::core::result::Result::Ok(value) => value,
                                ::core::result::Result::Err(e) => {
                                    return ::core::result::Result::Err(
                                        $crate::contract::HandlerFailure::Service(e),
                                    )
                                }
                            };
                            $crate::__contract_pack_return!(Codec, value; $($ret)?)
                        })
                    }
                )*

                ::std::vec![
                    $(
                        (
                            stringify!($method),
                            $method::<S, C> as $crate::contract::HandlerFn<S>,
                        ),
                    )*
                ]
            }
        }

        #[doc = concat!("Client proxy for the `", stringify!($name), "` contract.")]
        $vis struct $client<R, C = $crate::codec::MsgPackCodec> {
            remote: R,
            _codec: ::core::marker::PhantomData<fn() -> C>,
        }

        impl<R: ::core::clone::Clone, C> ::core::clone::Clone for $client<R, C> {
            fn clone(&self) -> Self {
                Self {
                    remote: self.remote.clone(),
                    _codec: ::core::marker::PhantomData,
                }
            }
        }

        impl<R, C> $client<R, C>
        where
            R: $crate::contract::RemoteCall,
            C: $crate::codec::PayloadCodec,
        {
            /// Wrap a remote.
            pub fn new(remote: R) -> Self {
                Self {
                    remote,
                    _codec: ::core::marker::PhantomData,
                }
            }

            /// The remote this proxy sends through.
            pub fn remote(&self) -> &R {
                &self.remote
            }

            $(
                $(#[$fmeta])*
                pub async fn $method(&self $(, $arg: $ty)*) -> $crate::Result<$crate::__contract_ret!($($ret)?)> {
                    let payload = $crate::__contract_pack_args!(C; $($arg),*);
                    let reply = $crate::contract::RemoteCall::invoke(
                        &self.remote,
                        stringify!($method),
                        payload,
                    )
                    .await?;
                    $crate::__contract_unpack_return!(C, reply; $($ret)?)
                }
            )*
        }

        impl<R, C> $crate::contract::ClientProxy<R> for $client<R, C>
        where
            R: $crate::contract::RemoteCall,
            C: $crate::codec::PayloadCodec,
        {
            type Contract = $marker;

            fn from_remote(remote: R) -> Self {
                Self::new(remote)
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __contract_ret {
    () => { () };
    ($ret:ty) => { $ret };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __contract_returns {
    () => { ::core::option::Option::None };
    ($ret:ty) => { ::core::option::Option::Some(stringify!($ret)) };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __contract_pack_args {
    ($codec:ident; ) => { $crate::bytes::Bytes::new() };
    ($codec:ident; $($arg:ident),+) => {
        $crate::bytes::Bytes::from(
            <$codec as $crate::codec::PayloadCodec>::encode(&($(&$arg,)+))?,
        )
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __contract_unpack {
    ($codec:ident, $payload:ident; ) => {
        let _ = &$payload;
    };
    ($codec:ident, $payload:ident; $($arg:ident : $ty:ty),+) => {
        let ($($arg,)+): ($($ty,)+) =
            match <$codec as $crate::codec::PayloadCodec>::decode(&$payload) {
                ::core::result::Result::Ok(args) => args,
                ::core::result::Result::Err(e) => {
                    return ::core::result::Result::Err(
                        $crate::contract::HandlerFailure::Fatal(e),
                    )
                }
            };
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __contract_pack_return {
    ($codec:ident, $value:ident; ) => {{
        let () = $value;
        ::core::result::Result::Ok($crate::bytes::Bytes::new())
    }};
    ($codec:ident, $value:ident; $ret:ty) => {
        match <$codec as $crate::codec::PayloadCodec>::encode(&$value) {
            ::core::result::Result::Ok(bytes) => {
                ::core::result::Result::Ok($crate::bytes::Bytes::from(bytes))
            }
            ::core::result::Result::Err(e) => {
                ::core::result::Result::Err($crate::contract::HandlerFailure::Fatal(e))
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __contract_unpack_return {
    ($codec:ident, $reply:ident; ) => {{
        let _ = $reply;
        ::core::result::Result::Ok(())
    }};
    ($codec:ident, $reply:ident; $ret:ty) => {
        <$codec as $crate::codec::PayloadCodec>::decode::<$ret>(&$reply)
    };
}
