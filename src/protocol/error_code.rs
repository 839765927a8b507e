//! Server error codes.
//!
//! Every numeric code the server can return in an `error` field. Codes are
//! preserved exactly; values outside the table survive as `Unknown`.

use std::fmt;

macro_rules! error_codes {
    ($($name:ident = $code:literal => $desc:literal,)*) => {
        /// Numeric error code returned by the server.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ErrorCode {
            $($name,)*
            /// Code not present in the table.
            Unknown(u32),
        }

        impl ErrorCode {
            /// Map a wire value to its code.
            pub fn from_code(code: u32) -> Self {
                match code {
                    $($code => Self::$name,)*
                    other => Self::Unknown(other),
                }
            }

            /// Wire value of the code.
            pub fn code(self) -> u32 {
                match self {
                    $(Self::$name => $code,)*
                    Self::Unknown(code) => code,
                }
            }

            /// Human-readable description.
            pub fn description(self) -> &'static str {
                match self {
                    $(Self::$name => $desc,)*
                    Self::Unknown(_) => "Unknown error",
                }
            }
        }
    };
}

error_codes! {
    NoError = 0 => "No error",
    ConnectFailed = 1 => "Connection to the server has failed",
    ServerIsNotVpn = 2 => "The destination server is not a VPN server",
    Disconnected = 3 => "The connection has been interrupted",
    ProtocolError = 4 => "Protocol error",
    ClientIsNotVpn = 5 => "Connecting client is not a VPN client",
    UserCancel = 6 => "User cancel",
    AuthtypeNotSupported = 7 => "Specified authentication method is not supported",
    HubNotFound = 8 => "The HUB does not exist",
    AuthFailed = 9 => "Authentication failure",
    HubStopping = 10 => "HUB is stopped",
    SessionRemoved = 11 => "Session has been deleted",
    AccessDenied = 12 => "Access denied",
    SessionTimeout = 13 => "Session times out",
    InvalidProtocol = 14 => "Protocol is invalid",
    TooManyConnection = 15 => "Too many connections",
    HubIsBusy = 16 => "Too many sessions of the HUB",
    ProxyConnectFailed = 17 => "Connection to the proxy server fails",
    ProxyError = 18 => "Proxy Error",
    ProxyAuthFailed = 19 => "Failed to authenticate on the proxy server",
    TooManyUserSession = 20 => "Too many sessions of the same user",
    LicenseError = 21 => "License error",
    DeviceDriverError = 22 => "Device driver error",
    InternalError = 23 => "Internal error",
    SecureDeviceOpenFailed = 24 => "The secure device cannot be opened",
    SecurePinLoginFailed = 25 => "PIN code is incorrect",
    SecureNoCert = 26 => "Specified certificate is not stored",
    SecureNoPrivateKey = 27 => "Specified private key is not stored",
    SecureCantWrite = 28 => "Write failure",
    ObjectNotFound = 29 => "Specified object can not be found",
    VlanAlreadyExists = 30 => "Virtual LAN card with the specified name already exists",
    VlanInstallError = 31 => "Specified virtual LAN card cannot be created",
    VlanInvalidName = 32 => "Specified name of the virtual LAN card is invalid",
    NotSupported = 33 => "Unsupported",
    AccountAlreadyExists = 34 => "Account already exists",
    AccountActive = 35 => "Account is operating",
    AccountNotFound = 36 => "Specified account doesn't exist",
    AccountInactive = 37 => "Account is offline",
    InvalidParameter = 38 => "Parameter is invalid",
    SecureDeviceError = 39 => "Error has occurred in the operation of the secure device",
    NoSecureDeviceSpecified = 40 => "Secure device is not specified",
    VlanIsUsed = 41 => "Virtual LAN card in use by account",
    VlanForAccountNotFound = 42 => "Virtual LAN card of the account can not be found",
    VlanForAccountUsed = 43 => "Virtual LAN card of the account is already in use",
    VlanForAccountDisabled = 44 => "Virtual LAN card of the account is disabled",
    InvalidValue = 45 => "Value is invalid",
    NotFarmController = 46 => "Not a farm controller",
    TryingToConnect = 47 => "Attempting to connect",
    ConnectToFarmController = 48 => "Failed to connect to the farm controller",
    CouldNotHostHubOnFarm = 49 => "A virtual HUB on farm could not be created",
    FarmMemberHubAdmin = 50 => "HUB cannot be managed on a farm member",
    NullPasswordLocalOnly = 51 => "Accepting only local connections for an empty password",
    NotEnoughRight = 52 => "Right is insufficient",
    ListenerNotFound = 53 => "Listener can not be found",
    ListenerAlreadyExists = 54 => "Listener already exists",
    NotFarmMember = 55 => "Not a farm member",
    CipherNotSupported = 56 => "Encryption algorithm is not supported",
    HubAlreadyExists = 57 => "HUB already exists",
    TooManyHubs = 58 => "Too many HUBs",
    LinkAlreadyExists = 59 => "Link already exists",
    LinkCantCreateOnFarm = 60 => "The link can not be created on the server farm",
    LinkIsOffline = 61 => "Link is off-line",
    TooManyAccessList = 62 => "Too many access list",
    TooManyUser = 63 => "Too many users",
    TooManyGroup = 64 => "Too many Groups",
    GroupNotFound = 65 => "Group can not be found",
    UserAlreadyExists = 66 => "User already exists",
    GroupAlreadyExists = 67 => "Group already exists",
    UserAuthtypeNotPassword = 68 => "Authentication method of the user is not a password authentication",
    OldPasswordWrong = 69 => "The user does not exist or the old password is wrong",
    LinkCantDisconnect = 73 => "Cascade session cannot be disconnected",
    AccountNotPresent = 74 => "Not completed configure the connection to the VPN server",
    AlreadyOnline = 75 => "It is already online",
    Offline = 76 => "It is offline",
    NotRsa1024 = 77 => "The certificate is not RSA 1024bit",
    SnatCantDisconnect = 78 => "SecureNAT session cannot be disconnected",
    SnatNeedStandalone = 79 => "SecureNAT works only in stand-alone HUB",
    SnatNotRunning = 80 => "SecureNAT function is not working",
    SeVpnBlock = 81 => "Stopped by PacketiX VPN Block",
    BridgeCantDisconnect = 82 => "Bridge session can not be disconnected",
    LocalBridgeStopping = 83 => "Bridge function is stopped",
    LocalBridgeUnsupported = 84 => "Bridge feature is not supported",
    CertNotTrusted = 85 => "Certificate of the destination server can not be trusted",
    ProductCodeInvalid = 86 => "Product code is different",
    VersionInvalid = 87 => "Version is different",
    CaptureDeviceAddError = 88 => "Adding capture device failure",
    VpnCodeInvalid = 89 => "VPN code is different",
    CaptureNotFound = 90 => "Capture device can not be found",
    Layer3CantDisconnect = 91 => "Layer-3 session cannot be disconnected",
    Layer3SwExists = 92 => "L3 switch of the same already exists",
    Layer3SwNotFound = 93 => "Layer-3 switch can not be found",
    InvalidName = 94 => "Name is invalid",
    Layer3IfAddFailed = 95 => "Failed to add interface",
    Layer3IfDelFailed = 96 => "Failed to delete the interface",
    Layer3IfExists = 97 => "Interface that you specified already exists",
    Layer3TableAddFailed = 98 => "Failed to add routing table",
    Layer3TableDelFailed = 99 => "Failed to delete the routing table",
    Layer3TableExists = 100 => "Routing table entry that you specified already exists",
    BadClock = 101 => "Clock is out of sync",
    Layer3CantStartSwitch = 102 => "The Virtual Layer 3 Switch can not be started",
    ClientLicenseNotEnough = 103 => "Client connection licenses shortage",
    BridgeLicenseNotEnough = 104 => "Bridge connection licenses shortage",
    ServerCantAccept = 105 => "Server cannot accept the connection for technical reasons",
    ServerCertExpires = 106 => "Destination VPN server has expired",
    MonitorModeDenied = 107 => "Monitor port mode was rejected",
    BridgeModeDenied = 108 => "Bridge-mode or Routing-mode was rejected",
    IpAddressDenied = 109 => "Client IP address is denied",
    TooManyItems = 110 => "Too many items",
    MemoryNotEnough = 111 => "Out of memory",
    ObjectExists = 112 => "Object already exists",
    Fatal = 113 => "A fatal error occurred",
    ServerLicenseFailed = 114 => "License violation has occurred on the server side",
    ServerInternetFailed = 115 => "Server side is not connected to the Internet",
    ClientLicenseFailed = 116 => "License violation occurs on the client side",
    BadCommandOrParam = 117 => "Command or parameter is invalid",
    InvalidLicenseKey = 118 => "License key is invalid",
    NoVpnServerLicense = 119 => "There is no valid license for the VPN Server",
    NoVpnClusterLicense = 120 => "There is no cluster license",
    NotAdminpackServer = 121 => "Not trying to connect to a server with the Administrator Pack license",
    NotAdminpackServerNet = 122 => "Not trying to connect to a server with the Administrator Pack license (for .NET)",
    BetaExpires = 123 => "Destination Beta VPN Server has expired",
    BrandedCToS = 124 => "Branding string of connection limit is different (Authentication on the server side)",
    BrandedCFromS = 125 => "Branding string of connection limit is different (Authentication for client-side)",
    AutoDisconnected = 126 => "VPN session is disconnected for a certain period of time has elapsed",
    ClientIdRequired = 127 => "Client ID does not match",
    TooManyUsersCreated = 128 => "Too many created users",
    SubscriptionIsOlder = 129 => "Subscription expiration date Is earlier than the build date of the VPN Server",
    IllegalTrialVersion = 130 => "Many trial license is used continuously",
    NatTTwoOrMore = 131 => "There are multiple servers in the back of a global IP address in the NAT-T connection",
    DuplicateDdnsKey = 132 => "DDNS host key duplicate",
    DdnsHostnameExists = 133 => "Specified DDNS host name already exists",
    DdnsHostnameInvalidChar = 134 => "Characters that can not be used for the host name is included",
    DdnsHostnameTooLong = 135 => "Host name is too long",
    DdnsHostnameIsEmpty = 136 => "Host name is not specified",
    DdnsHostnameTooShort = 137 => "Host name is too short",
    Mschap2PasswordNeedReset = 138 => "Necessary that password is changed",
    DdnsDisconnected = 139 => "Communication to the dynamic DNS server is disconnected",
    SpecialListenerIcmpError = 140 => "The ICMP socket can not be opened",
    SpecialListenerDnsError = 141 => "Socket for DNS port can not be opened",
    OpenvpnIsNotEnabled = 142 => "OpenVPN server feature is not enabled",
    NotSupportedAuthOnOpensource = 143 => "It is the type of user authentication that are not supported in the open source version",
    Vpngate = 144 => "Operation on VPN Gate Server is not available",
    VpngateClient = 145 => "Operation on VPN Gate Client is not available",
    VpngateInclientCantStop = 146 => "Can not be stopped if operating within VPN Client mode",
    NotSupportedFunctionOnOpensource = 147 => "It is a feature that is not supported in the open source version",
    Suspending = 148 => "System is suspending",
}

impl ErrorCode {
    /// Whether this is the success code.
    pub fn is_ok(self) -> bool {
        self == Self::NoError
    }
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        Self::from_code(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}
